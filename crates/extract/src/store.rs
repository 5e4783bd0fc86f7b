//! In-memory narrative graph store.

use narragraph_core::{
    ActionEdge, EntityNode, LayoutController, LocationNode, NarrativeGraphStore, TextSegment,
};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Snapshot of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub text: String,
    pub entities: Vec<EntityNode>,
    pub locations: Vec<LocationNode>,
    pub actions: Vec<ActionEdge>,
    pub selected_nodes: Vec<String>,
    pub selected_edges: Vec<String>,
    pub filtered_segment: Option<TextSegment>,
    pub highlighted_segment: Option<TextSegment>,
}

/// Mutex-guarded graph store for the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: Mutex<GraphSnapshot>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let store = Self::default();
        store.set_text(text);
        store
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.lock().text = text.into();
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, GraphSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NarrativeGraphStore for InMemoryGraphStore {
    fn entity_nodes(&self) -> Vec<EntityNode> {
        self.lock().entities.clone()
    }

    fn location_nodes(&self) -> Vec<LocationNode> {
        self.lock().locations.clone()
    }

    fn action_edges(&self) -> Vec<ActionEdge> {
        self.lock().actions.clone()
    }

    fn set_entity_nodes(&self, nodes: Vec<EntityNode>) {
        self.lock().entities = nodes;
    }

    fn set_location_nodes(&self, nodes: Vec<LocationNode>) {
        self.lock().locations = nodes;
    }

    fn set_action_edges(&self, edges: Vec<ActionEdge>) {
        self.lock().actions = edges;
    }

    fn set_selected_nodes(&self, ids: Vec<String>) {
        self.lock().selected_nodes = ids;
    }

    fn set_selected_edges(&self, ids: Vec<String>) {
        self.lock().selected_edges = ids;
    }

    fn set_filtered_actions_segment(&self, segment: Option<TextSegment>) {
        self.lock().filtered_segment = segment;
    }

    fn set_highlighted_actions_segment(&self, segment: Option<TextSegment>) {
        self.lock().highlighted_segment = segment;
    }

    fn text(&self) -> String {
        self.lock().text.clone()
    }
}

/// Layout controller for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLayout;

impl LayoutController for NoopLayout {
    fn stop_all_simulations(&self) {}
}
