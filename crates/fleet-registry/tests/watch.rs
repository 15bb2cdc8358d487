//! Fan-out worker and mirror behaviour against the in-memory substrate

use fleet_a2a::AgentCard;
use fleet_kv::{KvStore, MemoryStore};
use fleet_registry::{
    AGENT_URL_FIELD, AgentPublisher, ChangeEvent, ChangeKind, Dispatch, HandlerError,
    MirrorConfig, REGISTRY_KEY, Registry, RegistryConfig, SemanticMirror, unix_now,
};
use fleet_vector::{MemoryIndex, SemanticIndex};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn card(name: &str, url: &str) -> AgentCard {
    AgentCard::new(name, url).with_description(format!("{name} handles things"))
}

fn fast_config() -> RegistryConfig {
    RegistryConfig::default()
        .with_reconnect_backoff(Duration::from_millis(10), Duration::from_millis(50))
}

async fn setup() -> (Arc<MemoryStore>, Arc<Registry>, AgentPublisher) {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new(store.clone(), fast_config())
        .bootstrap()
        .await
        .unwrap();
    let publisher = AgentPublisher::new(store.clone());
    (store, registry, publisher)
}

async fn wait_for_subscribers(store: &MemoryStore, count: usize) {
    tokio::time::timeout(WAIT, async {
        while store.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("watch worker should subscribe");
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event should arrive")
        .expect("channel open")
}

#[tokio::test]
async fn test_add_and_remove_are_delivered_after_replica_update() {
    let (store, registry, publisher) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let observer = Arc::clone(&registry);

    let watch = registry.watch(
        move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
            let in_replica = observer.list_live().iter().any(|c| c.url == event.url);
            let _ = tx.send((event.clone(), in_replica));
            Ok(Dispatch::Done)
        },
        &ChangeKind::ALL,
    );
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("A", "http://a:1")).await.unwrap();
    let (event, in_replica) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Add);
    assert_eq!(event.url, "http://a:1");
    assert_eq!(event.descriptor.unwrap().name, "A");
    assert!(in_replica);

    publisher.unregister("http://a:1").await.unwrap();
    let (event, in_replica) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Remove);
    assert!(event.descriptor.is_none());
    assert!(!in_replica);
    assert!(registry.is_empty());

    watch.stop().await;
}

#[tokio::test]
async fn test_kind_filter_still_updates_replica() {
    let (store, registry, publisher) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watch = registry.watch(
        move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
            let _ = tx.send(event.clone());
            Ok(Dispatch::Done)
        },
        &[ChangeKind::Remove],
    );
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("A", "http://a:1")).await.unwrap();
    publisher.unregister("http://a:1").await.unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event.kind, ChangeKind::Remove);
    assert!(rx.try_recv().is_err());

    watch.stop().await;
}

#[tokio::test]
async fn test_handler_failures_do_not_stop_delivery() {
    let (store, registry, publisher) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let watch = registry.watch(
        move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(HandlerError::from("first one fails")),
                1 => panic!("second one panics"),
                _ => {
                    let _ = tx.send(event.clone());
                    Ok(Dispatch::Done)
                }
            }
        },
        &[ChangeKind::Add],
    );
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("A", "http://a:1")).await.unwrap();
    publisher.register(&card("B", "http://b:1")).await.unwrap();
    publisher.register(&card("C", "http://c:1")).await.unwrap();

    assert_eq!(next_event(&mut rx).await.url, "http://c:1");
    assert_eq!(registry.len(), 3);
    assert!(!watch.is_finished());

    watch.stop().await;
}

#[tokio::test]
async fn test_deferred_work_is_driven_to_completion() {
    let (store, registry, publisher) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watch = registry.watch(
        move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
            let tx = tx.clone();
            let url = event.url.clone();
            Ok(Dispatch::deferred(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(url).map_err(HandlerError::new)
            }))
        },
        &[ChangeKind::Add],
    );
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("A", "http://a:1")).await.unwrap();
    let url = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(url, "http://a:1");

    watch.stop().await;
}

#[tokio::test]
async fn test_reconnect_reconciles_missed_changes() {
    let (store, registry, publisher) = setup().await;
    publisher.register(&card("Old", "http://old:1")).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watch = registry.watch(
        move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
            let _ = tx.send(event.clone());
            Ok(Dispatch::Done)
        },
        &ChangeKind::ALL,
    );
    wait_for_subscribers(&store, 1).await;
    // The first subscription reconciles the agent registered before the watch
    let event = next_event(&mut rx).await;
    assert_eq!((event.kind, event.url.as_str()), (ChangeKind::Add, "http://old:1"));

    store.set_subscriptions_available(false);
    store.disconnect_subscribers();

    publisher.register(&card("New", "http://new:1")).await.unwrap();
    publisher.unregister("http://old:1").await.unwrap();

    store.set_subscriptions_available(true);

    let mut seen = vec![next_event(&mut rx).await, next_event(&mut rx).await];
    seen.sort_by(|a, b| a.url.cmp(&b.url));
    assert_eq!(seen[0].kind, ChangeKind::Add);
    assert_eq!(seen[0].url, "http://new:1");
    assert_eq!(seen[1].kind, ChangeKind::Remove);
    assert_eq!(seen[1].url, "http://old:1");

    let live: Vec<String> = registry.list_live().iter().map(|c| c.url.clone()).collect();
    assert_eq!(live, vec!["http://new:1".to_string()]);

    // Delivery continues on the rebuilt subscription
    publisher.unregister("http://new:1").await.unwrap();
    assert_eq!(next_event(&mut rx).await.kind, ChangeKind::Remove);

    watch.stop().await;
}

#[tokio::test]
async fn test_stop_ends_the_worker() {
    let (store, registry, _) = setup().await;
    let watch = registry.watch(
        |_: &ChangeEvent| -> Result<Dispatch, HandlerError> { Ok(Dispatch::Done) },
        &ChangeKind::ALL,
    );
    wait_for_subscribers(&store, 1).await;

    tokio::time::timeout(WAIT, watch.stop()).await.unwrap();
    assert_eq!(store.subscriber_count(), 0);
}

#[tokio::test]
async fn test_agents_pruned_during_an_outage_are_removed_after_reconnect() {
    let (store, registry, publisher) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watch = registry.watch(
        move |event: &ChangeEvent| -> Result<Dispatch, HandlerError> {
            let _ = tx.send(event.clone());
            Ok(Dispatch::Done)
        },
        &ChangeKind::ALL,
    );
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("A", "http://a:1")).await.unwrap();
    publisher.register(&card("B", "http://b:1")).await.unwrap();
    assert_eq!(next_event(&mut rx).await.kind, ChangeKind::Add);
    assert_eq!(next_event(&mut rx).await.kind, ChangeKind::Add);

    store.set_subscriptions_available(false);
    store.disconnect_subscribers();

    assert!(registry.deregister("http://a:1").await.unwrap());
    assert_eq!(registry.reap_at(unix_now() + 90.0).await.unwrap(), 1);
    assert!(registry.is_empty());

    store.set_subscriptions_available(true);

    let mut removed = vec![next_event(&mut rx).await, next_event(&mut rx).await];
    removed.sort_by(|a, b| a.url.cmp(&b.url));
    assert!(removed.iter().all(|e| e.kind == ChangeKind::Remove));
    assert_eq!(removed[0].url, "http://a:1");
    assert_eq!(removed[1].url, "http://b:1");

    watch.stop().await;
}

fn mirrored(index: &MemoryIndex) -> Vec<String> {
    let mut urls: Vec<String> = index
        .documents("agent_cards")
        .iter()
        .filter_map(|d| d.metadata_str(AGENT_URL_FIELD))
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    urls.sort();
    urls
}

async fn wait_for_mirror(index: &MemoryIndex, expected: &[&str]) {
    tokio::time::timeout(WAIT, async {
        while mirrored(index) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("mirror should converge");
}

#[tokio::test]
async fn test_mirror_drops_agent_reaped_during_an_outage() {
    let (store, registry, publisher) = setup().await;
    let index = Arc::new(MemoryIndex::new());
    let mirror = Arc::new(SemanticMirror::new(index.clone(), MirrorConfig::default()));
    mirror.ensure_collection().await.unwrap();
    let handle = Arc::clone(&mirror).start(&registry);
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("B", "http://b:1")).await.unwrap();
    wait_for_mirror(&index, &["http://b:1"]).await;

    store.set_subscriptions_available(false);
    store.disconnect_subscribers();
    assert_eq!(registry.reap_at(unix_now() + 90.0).await.unwrap(), 1);
    store.set_subscriptions_available(true);

    wait_for_mirror(&index, &[]).await;
    handle.stop().await;
}

#[tokio::test]
async fn test_mirror_start_drops_documents_of_departed_agents() {
    let store = Arc::new(MemoryStore::new());
    AgentPublisher::new(store.clone())
        .register(&card("Live", "http://live:1"))
        .await
        .unwrap();
    let registry = Registry::new(store.clone(), fast_config())
        .bootstrap()
        .await
        .unwrap();

    let index = Arc::new(MemoryIndex::new());
    let mirror = Arc::new(SemanticMirror::new(index.clone(), MirrorConfig::default()));
    mirror.ensure_collection().await.unwrap();
    let stale = SemanticMirror::document_for(&card("Gone", "http://gone:1")).unwrap();
    index.add_documents("agent_cards", vec![stale]).await.unwrap();

    let handle = Arc::clone(&mirror).start(&registry);
    wait_for_mirror(&index, &["http://live:1"]).await;
    handle.stop().await;
}

#[tokio::test]
async fn test_mirror_converges_when_its_queue_overflows() {
    let (store, registry, publisher) = setup().await;
    let index = Arc::new(MemoryIndex::new());
    let mirror = Arc::new(SemanticMirror::new(
        index.clone(),
        MirrorConfig::default().with_queue_capacity(1),
    ));
    mirror.ensure_collection().await.unwrap();
    let handle = Arc::clone(&mirror).start(&registry);
    wait_for_subscribers(&store, 1).await;

    let mut expected: Vec<String> = (0..40).map(|i| format!("http://agent-{i:02}:1")).collect();
    for url in &expected {
        publisher.register(&card("Agent", url)).await.unwrap();
    }
    for url in expected.drain(..10) {
        publisher.unregister(&url).await.unwrap();
    }

    let expected: Vec<&str> = expected.iter().map(String::as_str).collect();
    wait_for_mirror(&index, &expected).await;
    handle.stop().await;
}

#[tokio::test]
async fn test_mirror_follows_registry() {
    let store = Arc::new(MemoryStore::new());
    let publisher = AgentPublisher::new(store.clone());
    publisher.register(&card("Boot", "http://boot:1")).await.unwrap();
    let registry = Registry::new(store.clone(), fast_config())
        .bootstrap()
        .await
        .unwrap();

    let index = Arc::new(MemoryIndex::new());
    let mirror = Arc::new(SemanticMirror::new(index.clone(), MirrorConfig::default()));
    mirror.ensure_collection().await.unwrap();
    let handle = Arc::clone(&mirror).start(&registry);
    wait_for_subscribers(&store, 1).await;

    publisher.register(&card("A", "http://a:1")).await.unwrap();
    publisher.register(&card("B", "http://b:1")).await.unwrap();
    publisher.unregister("http://a:1").await.unwrap();

    wait_for_mirror(&index, &["http://b:1", "http://boot:1"]).await;

    handle.stop().await;
    assert!(store.hget(REGISTRY_KEY, "http://b:1").await.unwrap().is_some());
}
