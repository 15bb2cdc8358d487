//! In-memory replica of the live descriptors
//!
//! Writers (the fan-out worker and the reaper) mutate through the lock;
//! readers clone the `Arc` under the lock and iterate without it.

use fleet_a2a::AgentCard;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct Replica {
    cards: Mutex<Arc<Vec<AgentCard>>>,
}

impl Replica {
    pub fn new(cards: Vec<AgentCard>) -> Self {
        Self {
            cards: Mutex::new(Arc::new(cards)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<AgentCard>>> {
        self.cards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current descriptors, in insertion order
    pub fn snapshot(&self) -> Arc<Vec<AgentCard>> {
        Arc::clone(&self.lock())
    }

    pub fn replace(&self, cards: Vec<AgentCard>) {
        *self.lock() = Arc::new(cards);
    }

    /// Add `card` unless its url is already present; returns whether it was added
    pub fn insert_if_absent(&self, card: AgentCard) -> bool {
        let mut guard = self.lock();
        if guard.iter().any(|c| c.url == card.url) {
            return false;
        }
        Arc::make_mut(&mut guard).push(card);
        true
    }

    /// Evict `url`; returns whether it was present
    pub fn remove(&self, url: &str) -> bool {
        let mut guard = self.lock();
        if !guard.iter().any(|c| c.url == url) {
            return false;
        }
        Arc::make_mut(&mut guard).retain(|c| c.url != url);
        true
    }

    /// Evict every url in `urls`; returns how many were present
    pub fn remove_all(&self, urls: &[String]) -> usize {
        let mut guard = self.lock();
        let before = guard.len();
        if guard.iter().any(|c| urls.contains(&c.url)) {
            Arc::make_mut(&mut guard).retain(|c| !urls.contains(&c.url));
        }
        before - guard.len()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().iter().any(|c| c.url == url)
    }

    pub fn urls(&self) -> Vec<String> {
        self.lock().iter().map(|c| c.url.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
