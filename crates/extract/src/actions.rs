//! Per-sentence action extraction.
//!
//! Each extractor owns the edges it contributed to the graph. Every usable
//! partial result and the final result replace that set wholesale, so the
//! graph converges on the final answer while the response streams.

use async_trait::async_trait;
use narragraph_core::{
    ActionData, ActionEdge, EntityNode, LocationNode, NarrativeGraphStore, TaskError,
};
use narragraph_prompts::{PromptResult, PromptTask, Schema, StructuredTask};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::context::{ExtractionContext, UpdateCallback, new_id, same_name};

/// One action as the model reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAction {
    pub name: String,
    pub source: String,
    pub target: String,
    pub passage: String,
    pub source_location: String,
    pub target_location: String,
}

impl ExtractedAction {
    /// Still missing a required leaf (a back-filled placeholder).
    fn is_placeholder(&self) -> bool {
        [&self.name, &self.source, &self.target, &self.passage]
            .iter()
            .any(|field| field.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionsResult {
    pub actions: Vec<ExtractedAction>,
}

pub fn actions_schema() -> Schema {
    Schema::object([(
        "actions",
        Schema::array(Schema::object([
            ("name", Schema::String),
            ("source", Schema::String),
            ("target", Schema::String),
            ("passage", Schema::String),
            ("source_location", Schema::String),
            ("target_location", Schema::String),
        ])),
    )])
}

fn actions_prompt(entities: &[EntityNode], before: &str, sentence: &str, after: &str) -> String {
    let known = if entities.is_empty() {
        "(none yet)".to_string()
    } else {
        entities
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "You are building a graph of who does what to whom in a story.\n\
         Known entities: {known}\n\n\
         Text before the sentence:\n\"\"\"{before}\"\"\"\n\n\
         Sentence to analyse:\n\"\"\"{sentence}\"\"\"\n\n\
         Text after the sentence:\n\"\"\"{after}\"\"\"\n\n\
         List every action in the sentence where one entity acts on another. \
         For each action give `name` (a short verb phrase), `source` (the entity acting), \
         `target` (the entity acted upon), `passage` (the exact words of the sentence that \
         describe the action), `source_location` and `target_location` (where the source \
         and the target are, or an empty string if unknown). Reuse the known entity names \
         when they refer to the same entity. Only use the surrounding text to resolve who \
         is who; do not extract actions from it.\n\
         Answer as JSON: {{\"actions\": [...]}}"
    )
}

/// Writes an extractor's actions into the graph store.
struct ActionWriter {
    store: Arc<dyn NarrativeGraphStore>,
    /// Prefix of every edge id this extractor writes
    edge_prefix: String,
    contributed: Mutex<Vec<String>>,
    on_update: Option<UpdateCallback>,
}

impl ActionWriter {
    fn apply(&self, result: &ActionsResult) {
        let mut contributed = self
            .contributed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut edges: Vec<ActionEdge> = self
            .store
            .action_edges()
            .into_iter()
            .filter(|edge| !contributed.contains(&edge.id))
            .collect();
        let mut entities = self.store.entity_nodes();
        let mut locations = self.store.location_nodes();
        let (known_entities, known_locations) = (entities.len(), locations.len());

        let mut written = Vec::new();
        for (index, action) in result.actions.iter().enumerate() {
            if action.is_placeholder() {
                continue;
            }
            let source = entity_id(&mut entities, &action.source);
            let target = entity_id(&mut entities, &action.target);
            ensure_location(&mut locations, &action.source_location);
            ensure_location(&mut locations, &action.target_location);

            let id = format!("{}-{index}", self.edge_prefix);
            written.push(id.clone());
            edges.push(ActionEdge {
                id,
                source,
                target,
                data: ActionData {
                    name: action.name.trim().to_string(),
                    passage: action.passage.clone(),
                    source_location: action.source_location.trim().to_string(),
                    target_location: action.target_location.trim().to_string(),
                },
            });
        }

        if entities.len() != known_entities {
            self.store.set_entity_nodes(entities);
        }
        if locations.len() != known_locations {
            self.store.set_location_nodes(locations);
        }
        self.store.set_action_edges(edges);
        trace!(prefix = %self.edge_prefix, edges = written.len(), "Applied actions");
        *contributed = written;
        drop(contributed);

        if let Some(callback) = &self.on_update {
            callback();
        }
    }
}

/// Id of the entity called `name`, creating it if needed.
fn entity_id(entities: &mut Vec<EntityNode>, name: &str) -> String {
    if let Some(existing) = entities.iter().find(|e| same_name(&e.name, name)) {
        return existing.id.clone();
    }
    let node = EntityNode::new(new_id(), name.trim());
    let id = node.id.clone();
    entities.push(node);
    id
}

fn ensure_location(locations: &mut Vec<LocationNode>, name: &str) {
    if name.trim().is_empty() || locations.iter().any(|l| same_name(&l.name, name)) {
        return;
    }
    locations.push(LocationNode::new(new_id(), name.trim(), ""));
}

/// Extracts the actions of one sentence unit, given its surrounding text
/// and the entities known when the extractor was built.
pub struct SentenceActionsExtractor {
    task: StructuredTask<ActionsResult>,
    writer: Arc<ActionWriter>,
}

impl SentenceActionsExtractor {
    pub fn new(
        context: &ExtractionContext,
        entities: &[EntityNode],
        before: &str,
        sentence: &str,
        after: &str,
        on_update: Option<UpdateCallback>,
    ) -> Self {
        let writer = Arc::new(ActionWriter {
            store: context.store.clone(),
            edge_prefix: format!("action-{}", new_id()),
            contributed: Mutex::new(Vec::new()),
            on_update,
        });
        let partial_writer = writer.clone();
        let task = context
            .structured(actions_prompt(entities, before, sentence, after), actions_schema())
            .with_partial_callback(move |partial: PromptResult<ActionsResult>| {
                partial_writer.apply(&partial.result)
            });
        Self { task, writer }
    }
}

#[async_trait]
impl PromptTask for SentenceActionsExtractor {
    type Output = PromptResult<ActionsResult>;

    async fn execute(&self) -> Result<Self::Output, TaskError> {
        let result = self.task.execute().await?;
        self.writer.apply(&result.result);
        Ok(result)
    }
}
