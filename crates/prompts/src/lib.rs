//! Prompt tasks for narragraph.
//!
//! A task turns a prompt into a result through the completion client:
//! [`TextTask`] streams free text, [`StructuredTask`] coerces the stream into
//! a [`Schema`] (with partial results, final-response recovery, prose
//! fallback and whole-attempt retry), and [`BatchTask`] runs tasks in order.

pub mod batch;
pub mod fallback;
pub mod partial;
pub mod recover;
pub mod schema;
pub mod structured;
pub mod task;
pub mod text;

pub use batch::{BatchTask, BoxedTask};
pub use fallback::{FallbackRegistry, ProseDomain, ProseParser};
pub use partial::{PartialJsonError, parse_partial};
pub use schema::{Schema, SchemaKind};
pub use structured::StructuredTask;
pub use task::{ExecutablePrompt, PartialCallback, PromptResult, PromptTask, RetryPolicy};
pub use text::TextTask;
