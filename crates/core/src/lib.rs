//! # narragraph core
//!
//! Domain types, traits, and error definitions for the narragraph
//! extraction pipeline. This crate has **no transport or parsing logic**;
//! it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here: the completion transport, the graph store,
//! the layout controller, the telemetry sink. Implementations live in
//! their respective crates (or in the embedding application), which keeps
//! the pipeline testable with scripted stand-ins.

pub mod error;
pub mod event;
pub mod graph;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, TaskError};
pub use event::{DomainEvent, EventBus, EventLog, SilentEventLog, TracingEventLog};
pub use graph::{
    ActionData, ActionEdge, EntityNode, EntityProperty, LayoutController, LocationNode,
    NarrativeGraphStore, TextSegment,
};
pub use message::{ChatMessage, Role};
pub use provider::{
    ChunkReceiver, CompletionRequest, CompletionResponse, CompletionTransport, ProviderId,
    ResponseFormat, StreamChunk, Usage,
};
