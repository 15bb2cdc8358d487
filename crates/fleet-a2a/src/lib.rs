//! # fleet-a2a
//!
//! Agent2Agent (A2A) protocol pieces used by the fleet: the agent card,
//! JSON-RPC `message/stream` envelopes and their streamed chunks, an HTTP
//! client (`client` feature) and an executor-driven server (`server`
//! feature).
//!
//! Every chunk of a streamed reply is a JSON-RPC response whose `result`
//! carries a `kind` discriminator: `task`, `message`, `status-update` or
//! `artifact-update`.

pub mod error;
pub mod types;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

pub use error::{A2aError, A2aResult, JsonRpcError};
pub use types::*;

#[cfg(feature = "client")]
pub use client::{A2aClient, ResponseStream};

#[cfg(feature = "server")]
pub use server::{A2aServer, AgentExecutor, ArtifactSink, RequestContext, SinkClosed, SinkEvent};
