//! Narrative graph value types and the collaborator traits the pipeline
//! reads and writes through.
//!
//! The graph itself is owned by an external store (a UI model, an
//! in-memory store in tests and the CLI). The core only reads snapshots and
//! writes whole replacement lists back.

use serde::{Deserialize, Serialize};

/// A character or object taking part in the narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<EntityProperty>,
}

impl EntityNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: String::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = emoji.into();
        self
    }
}

/// A numeric trait attached to an entity (e.g. "courage: 7").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProperty {
    pub name: String,
    pub value: i64,
}

/// A place where actions happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationNode {
    pub id: String,
    pub name: String,
    pub emoji: String,
}

impl LocationNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: emoji.into(),
        }
    }
}

/// Payload of an action edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    pub name: String,
    /// Verbatim text span the action was extracted from
    pub passage: String,
    pub source_location: String,
    pub target_location: String,
}

/// A directed action from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEdge {
    pub id: String,
    /// Source entity id
    pub source: String,
    /// Target entity id
    pub target: String,
    pub data: ActionData,
}

/// A byte range of the source text used for filter/highlight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub start: usize,
    pub end: usize,
}

/// Owner of the narrative graph plus its selection and highlight state.
///
/// Methods take `&self`; implementations use interior mutability so one
/// store can be shared between the change detector and every in-flight
/// extractor.
pub trait NarrativeGraphStore: Send + Sync {
    fn entity_nodes(&self) -> Vec<EntityNode>;
    fn location_nodes(&self) -> Vec<LocationNode>;
    fn action_edges(&self) -> Vec<ActionEdge>;

    fn set_entity_nodes(&self, nodes: Vec<EntityNode>);
    fn set_location_nodes(&self, nodes: Vec<LocationNode>);
    fn set_action_edges(&self, edges: Vec<ActionEdge>);

    fn set_selected_nodes(&self, ids: Vec<String>);
    fn set_selected_edges(&self, ids: Vec<String>);
    fn set_filtered_actions_segment(&self, segment: Option<TextSegment>);
    fn set_highlighted_actions_segment(&self, segment: Option<TextSegment>);

    /// The current full source text as the store knows it.
    fn text(&self) -> String;
}

/// Drives layout/physics simulation of the rendered graph.
pub trait LayoutController: Send + Sync {
    fn stop_all_simulations(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_data_uses_camel_case_on_the_wire() {
        let data = ActionData {
            name: "greets".into(),
            passage: "Alice greets Bob.".into(),
            source_location: "garden".into(),
            target_location: "garden".into(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["sourceLocation"], "garden");
        assert_eq!(json["targetLocation"], "garden");
    }

    #[test]
    fn entity_without_properties_omits_them() {
        let node = EntityNode::new("e1", "Alice").with_emoji("👧");
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("properties").is_none());
        let back: EntityNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
