//! Narrative extraction for narragraph.
//!
//! Segments source text into sentence units, runs prompt tasks over them
//! and writes entities, locations and actions into a
//! [`NarrativeGraphStore`](narragraph_core::NarrativeGraphStore).
//!
//! The [`ChangeDetector`] is the entry point for incremental updates: it
//! prunes what an edit invalidated and re-extracts only the sentences that
//! are new.

pub mod actions;
pub mod context;
pub mod detector;
pub mod entities;
pub mod locations;
pub mod segmenter;
pub mod store;

pub use actions::{ActionsResult, ExtractedAction, SentenceActionsExtractor, actions_schema};
pub use context::{ExtractionContext, UpdateCallback};
pub use detector::{
    ChangeDetector, DetectorDeps, FinishedCallback, RefreshHandle, RefreshOutcome, RefreshReport,
    prune_graph,
};
pub use entities::{EntitiesExtractor, EntitiesResult, ExtractedEntity, merge_entities};
pub use locations::{ExtractedLocation, LocationsExtractor, LocationsResult, merge_locations};
pub use segmenter::{DEFAULT_MIN_SENTENCE_CHARS, SentenceUnit, segment};
pub use store::{GraphSnapshot, InMemoryGraphStore, NoopLayout};
