//! LLM provider plumbing for narragraph.
//!
//! The profile registry describes each backend, the OpenAI-compatible
//! transport speaks HTTP/SSE to it, and the completion client ties the
//! active profile and credential together for the task layer.

pub mod client;
pub mod openai_compat;
pub mod profile;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use client::{ClientOptions, CompletionClient, FragmentStream, TransportFactory};
pub use openai_compat::OpenAiCompatTransport;
pub use profile::{AuthScheme, ProviderProfile, StructuredOutput};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedTransport, scripted_factory};
