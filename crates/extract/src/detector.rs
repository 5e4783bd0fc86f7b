//! Change detector: turns edits of the source text into action extraction.
//!
//! A refresh clears view state, prunes graph elements the new text no
//! longer supports, segments the text into sentence units and runs one
//! [`SentenceActionsExtractor`] per unit that is not already part of the
//! previous text, strictly in order, on a spawned tokio task.
//!
//! Refreshes are not serialised against each other. A second refresh while
//! the first batch is still running starts its own batch and both write to
//! the same store, so callers that care must wait on the returned handle
//! before refreshing again.

use narragraph_core::{Error, LayoutController, NarrativeGraphStore, Result, TaskError};
use narragraph_prompts::{BatchTask, BoxedTask, PromptResult, PromptTask};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actions::{ActionsResult, SentenceActionsExtractor};
use crate::context::{ExtractionContext, UpdateCallback};
use crate::segmenter::{DEFAULT_MIN_SENTENCE_CHARS, SentenceUnit, segment};

/// Called once when a refresh batch succeeds.
pub type FinishedCallback = Box<dyn FnOnce() + Send>;

/// Everything a change detector needs from the outside.
#[derive(Clone)]
pub struct DetectorDeps {
    pub context: ExtractionContext,
    pub layout: Arc<dyn LayoutController>,
    pub min_sentence_chars: usize,
}

impl DetectorDeps {
    pub fn new(context: ExtractionContext, layout: Arc<dyn LayoutController>) -> Self {
        Self {
            context,
            layout,
            min_sentence_chars: DEFAULT_MIN_SENTENCE_CHARS,
        }
    }

    pub fn with_min_sentence_chars(mut self, min_sentence_chars: usize) -> Self {
        self.min_sentence_chars = min_sentence_chars;
        self
    }
}

#[derive(Default)]
struct DetectorState {
    previous_text: String,
    on_update: Option<UpdateCallback>,
    on_refresh_done: Option<UpdateCallback>,
    disposed: bool,
}

/// What a refresh did.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The text equals the previous text; nothing was touched
    Unchanged,
    Started(RefreshHandle),
}

/// The result of a finished refresh batch.
#[derive(Debug)]
pub struct RefreshReport {
    /// Units that were sent for extraction, in order
    pub units: Vec<SentenceUnit>,
    pub results: Vec<PromptResult<ActionsResult>>,
}

/// Handle on a running refresh batch.
#[derive(Debug)]
pub struct RefreshHandle {
    units: Vec<SentenceUnit>,
    join: JoinHandle<std::result::Result<Vec<PromptResult<ActionsResult>>, TaskError>>,
}

impl RefreshHandle {
    /// Units being processed by this refresh.
    pub fn units(&self) -> &[SentenceUnit] {
        &self.units
    }

    /// Wait for the batch to settle.
    pub async fn wait(self) -> Result<RefreshReport> {
        let results = self
            .join
            .await
            .map_err(|e| Error::Internal(format!("refresh task failed: {e}")))??;
        Ok(RefreshReport {
            units: self.units,
            results,
        })
    }
}

/// Explicitly constructed change detector.
///
/// Lifecycle: [`ChangeDetector::create`], any number of refreshes,
/// [`ChangeDetector::reset`] to forget the previous text, and
/// [`ChangeDetector::dispose`] once the owner is done with it.
pub struct ChangeDetector {
    deps: DetectorDeps,
    state: Arc<Mutex<DetectorState>>,
}

impl ChangeDetector {
    pub fn create(deps: DetectorDeps) -> Self {
        Self {
            deps,
            state: Arc::new(Mutex::new(DetectorState::default())),
        }
    }

    /// Forget the previous text so the next refresh reprocesses everything.
    pub fn reset(&self) {
        lock(&self.state).previous_text.clear();
    }

    /// Drop callbacks and text. Later refreshes fail.
    pub fn dispose(&self) {
        let mut state = lock(&self.state);
        *state = DetectorState {
            disposed: true,
            ..DetectorState::default()
        };
    }

    /// Called on every graph change made by a refresh's extractors.
    pub fn set_on_update<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.state).on_update = Some(Arc::new(callback));
    }

    /// Called when a refresh batch settles, successfully or not.
    pub fn set_on_refresh_done<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.state).on_refresh_done = Some(Arc::new(callback));
    }

    pub fn previous_text(&self) -> String {
        lock(&self.state).previous_text.clone()
    }

    /// Bring the graph up to date with `text`.
    ///
    /// Fails with [`Error::Internal`] outside a tokio runtime, before
    /// touching the graph. Otherwise the previous text is replaced
    /// before this returns, even if the batch later fails, so failed units
    /// are not retried until the text changes again.
    pub fn refresh_from_text(
        &self,
        text: &str,
        on_update: Option<UpdateCallback>,
        on_finished: Option<FinishedCallback>,
    ) -> Result<RefreshOutcome> {
        let previous = {
            let state = lock(&self.state);
            if state.disposed {
                return Err(Error::Internal("change detector has been disposed".into()));
            }
            if state.previous_text == text {
                debug!("Text unchanged, skipping refresh");
                return Ok(RefreshOutcome::Unchanged);
            }
            state.previous_text.clone()
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("refresh needs a tokio runtime: {e}")))?;

        let store = &self.deps.context.store;
        self.deps.layout.stop_all_simulations();
        clear_view_state(store.as_ref());
        prune_graph(store.as_ref(), text);

        let segmented = segment(text, self.deps.min_sentence_chars);
        let total = segmented.len();
        let units: Vec<SentenceUnit> = segmented
            .into_iter()
            .filter(|unit| !previous.contains(&unit.text))
            .collect();
        info!(units = units.len(), unchanged = total - units.len(), "Refreshing narrative graph");

        let update = self.update_callback(on_update);
        let tasks: Vec<BoxedTask<PromptResult<ActionsResult>>> = units
            .iter()
            .map(|unit| {
                let extractor = SentenceActionsExtractor::new(
                    &self.deps.context,
                    &store.entity_nodes(),
                    &text[..unit.start],
                    &unit.text,
                    &text[unit.end..],
                    Some(update.clone()),
                );
                Box::new(extractor) as BoxedTask<PromptResult<ActionsResult>>
            })
            .collect();
        let batch = BatchTask::new(tasks);

        let state = self.state.clone();
        let join = runtime.spawn(async move {
            let result = batch.execute().await;
            match &result {
                Ok(results) => {
                    debug!(results = results.len(), "Refresh batch finished");
                    if let Some(finished) = on_finished {
                        finished();
                    }
                }
                Err(e) => warn!(error = %e, "Refresh batch failed"),
            }
            let done = lock(&state).on_refresh_done.clone();
            if let Some(done) = done {
                done();
            }
            result
        });

        lock(&self.state).previous_text = text.to_string();
        Ok(RefreshOutcome::Started(RefreshHandle { units, join }))
    }

    /// The per-call callback followed by whatever is registered when the
    /// update happens.
    fn update_callback(&self, on_update: Option<UpdateCallback>) -> UpdateCallback {
        let state = self.state.clone();
        Arc::new(move || {
            if let Some(callback) = &on_update {
                callback();
            }
            let registered = lock(&state).on_update.clone();
            if let Some(callback) = registered {
                callback();
            }
        })
    }
}

fn lock(state: &Mutex<DetectorState>) -> MutexGuard<'_, DetectorState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Selection and highlight refer to the old graph; drop them.
fn clear_view_state(store: &dyn NarrativeGraphStore) {
    store.set_selected_nodes(Vec::new());
    store.set_selected_edges(Vec::new());
    store.set_filtered_actions_segment(None);
    store.set_highlighted_actions_segment(None);
}

/// Remove graph elements `text` no longer supports.
///
/// Edges go when their passage is gone from the text, entities when their
/// name no longer occurs (case-insensitively), and locations when no
/// remaining edge starts or ends there.
pub fn prune_graph(store: &dyn NarrativeGraphStore, text: &str) {
    let edges: Vec<_> = store
        .action_edges()
        .into_iter()
        .filter(|edge| text.contains(&edge.data.passage))
        .collect();

    let lower = text.to_lowercase();
    let entities: Vec<_> = store
        .entity_nodes()
        .into_iter()
        .filter(|node| lower.contains(&node.name.to_lowercase()))
        .collect();

    let locations: Vec<_> = store
        .location_nodes()
        .into_iter()
        .filter(|location| {
            edges.iter().any(|edge| {
                edge.data.source_location == location.name
                    || edge.data.target_location == location.name
            })
        })
        .collect();

    debug!(
        edges = edges.len(),
        entities = entities.len(),
        locations = locations.len(),
        "Pruned graph"
    );
    store.set_action_edges(edges);
    store.set_entity_nodes(entities);
    store.set_location_nodes(locations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryGraphStore, NoopLayout};
    use narragraph_core::{ActionData, ActionEdge, EntityNode, LocationNode, TextSegment};

    fn edge(id: &str, passage: &str, location: &str) -> ActionEdge {
        ActionEdge {
            id: id.into(),
            source: "e1".into(),
            target: "e2".into(),
            data: ActionData {
                name: "meets".into(),
                passage: passage.into(),
                source_location: location.into(),
                target_location: location.into(),
            },
        }
    }

    #[test]
    fn prune_removes_unsupported_elements() {
        let store = InMemoryGraphStore::new();
        store.set_action_edges(vec![
            edge("a1", "Alice meets Bob", "Garden"),
            edge("a2", "Carol meets Dan", "Harbour"),
        ]);
        store.set_entity_nodes(vec![
            EntityNode::new("e1", "Alice"),
            EntityNode::new("e2", "Bob"),
            EntityNode::new("e3", "Carol"),
        ]);
        store.set_location_nodes(vec![
            LocationNode::new("l1", "Garden", "🌷"),
            LocationNode::new("l2", "Harbour", "⚓"),
        ]);

        prune_graph(&store, "alice meets Bob in the garden. Alice meets Bob again.");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.actions.len(), 1);
        assert_eq!(snapshot.actions[0].id, "a1");
        let names: Vec<_> = snapshot.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(snapshot.locations.len(), 1);
        assert_eq!(snapshot.locations[0].name, "Garden");
    }

    #[test]
    fn view_state_is_cleared() {
        let store = InMemoryGraphStore::new();
        store.set_selected_nodes(vec!["e1".into()]);
        store.set_selected_edges(vec!["a1".into()]);
        store.set_filtered_actions_segment(Some(TextSegment { start: 0, end: 3 }));
        store.set_highlighted_actions_segment(Some(TextSegment { start: 4, end: 9 }));
        clear_view_state(&store);
        let snapshot = store.snapshot();
        assert!(snapshot.selected_nodes.is_empty());
        assert!(snapshot.selected_edges.is_empty());
        assert!(snapshot.filtered_segment.is_none());
        assert!(snapshot.highlighted_segment.is_none());
    }

    #[test]
    fn refresh_outside_runtime_is_an_error() {
        let client = Arc::new(narragraph_providers::CompletionClient::new(
            narragraph_core::ProviderId::OpenAi,
            Default::default(),
        ));
        let store = Arc::new(InMemoryGraphStore::new());
        store.set_selected_nodes(vec!["e1".into()]);
        let context = ExtractionContext::new(client, store.clone());
        let detector = ChangeDetector::create(DetectorDeps::new(context, Arc::new(NoopLayout)));

        assert!(matches!(
            detector.refresh_from_text("Alice met Bob by the old mill.", None, None),
            Err(Error::Internal(_))
        ));
        assert_eq!(detector.previous_text(), "");
        assert_eq!(store.snapshot().selected_nodes, vec!["e1"]);
    }

    #[test]
    fn disposed_detector_refuses_refresh() {
        let client = Arc::new(narragraph_providers::CompletionClient::new(
            narragraph_core::ProviderId::OpenAi,
            Default::default(),
        ));
        let context = ExtractionContext::new(client, Arc::new(InMemoryGraphStore::new()));
        let detector = ChangeDetector::create(DetectorDeps::new(context, Arc::new(NoopLayout)));
        detector.set_on_update(|| {});
        detector.dispose();
        assert!(matches!(
            detector.refresh_from_text("Some text.", None, None),
            Err(Error::Internal(_))
        ));
        assert_eq!(detector.previous_text(), "");
    }
}
