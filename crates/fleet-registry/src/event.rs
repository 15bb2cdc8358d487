//! Change events and the handler contract of [`Registry::watch`](crate::Registry::watch)

use fleet_a2a::AgentCard;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Remove,
}

impl ChangeKind {
    /// Both kinds, the default watch filter
    pub const ALL: [ChangeKind; 2] = [ChangeKind::Add, ChangeKind::Remove];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Remove => "remove",
        }
    }
}

/// A live-set change; `descriptor` is present exactly for `Add`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<AgentCard>,
}

impl ChangeEvent {
    pub fn add(descriptor: AgentCard) -> Self {
        Self {
            kind: ChangeKind::Add,
            url: descriptor.url.clone(),
            descriptor: Some(descriptor),
        }
    }

    pub fn remove(url: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Remove,
            url: url.into(),
            descriptor: None,
        }
    }
}

/// What a handler asks the fan-out worker to do after it returns
pub enum Dispatch {
    /// Nothing left to do
    Done,
    /// Drive this future to completion off the delivery path
    Deferred(BoxFuture<'static, Result<(), HandlerError>>),
}

impl Dispatch {
    pub fn deferred<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Dispatch::Deferred(Box::pin(future))
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Done => f.write_str("Done"),
            Dispatch::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Subscriber to registry changes
///
/// Called on the fan-out worker, after the replica reflects the event. A slow
/// handler delays every later event; heavy work belongs in
/// [`Dispatch::Deferred`]. Errors and panics are logged and contained; the
/// release profile unwinds so a panic stays inside the worker.
pub trait ChangeHandler: Send + Sync + 'static {
    fn on_change(&self, event: &ChangeEvent) -> Result<Dispatch, HandlerError>;
}

impl<F> ChangeHandler for F
where
    F: Fn(&ChangeEvent) -> Result<Dispatch, HandlerError> + Send + Sync + 'static,
{
    fn on_change(&self, event: &ChangeEvent) -> Result<Dispatch, HandlerError> {
        self(event)
    }
}
