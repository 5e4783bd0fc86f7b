//! Whole-text entity extraction.

use async_trait::async_trait;
use narragraph_core::{EntityNode, EntityProperty, NarrativeGraphStore, TaskError};
use narragraph_prompts::{PromptResult, PromptTask, ProseDomain, Schema, StructuredTask};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{ExtractionContext, UpdateCallback, new_id, same_name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProperty {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub emoji: String,
    pub properties: Vec<ExtractedProperty>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitiesResult {
    pub entities: Vec<ExtractedEntity>,
}

pub fn entities_schema() -> Schema {
    Schema::object([(
        "entities",
        Schema::array(Schema::object([
            ("name", Schema::String),
            ("emoji", Schema::String),
            (
                "properties",
                Schema::array(Schema::object([
                    ("name", Schema::String),
                    ("value", Schema::Integer),
                ])),
            ),
        ])),
    )])
}

fn entities_prompt(text: &str) -> String {
    format!(
        "Read the story below and list its entities: characters, creatures and objects \
         that take part in the events.\n\n\"\"\"{text}\"\"\"\n\n\
         For each entity give `name` (as written in the story), `emoji` (one emoji that \
         represents it) and `properties`: a few traits, each with a `name` and an integer \
         `value` from 0 to 10.\n\
         Answer as JSON: {{\"entities\": [...]}}"
    )
}

/// Merge extracted entities into the known ones by case-insensitive name.
///
/// Known entities keep their id; a non-empty emoji or property list from
/// the model replaces the stored one.
pub fn merge_entities(known: &mut Vec<EntityNode>, extracted: &[ExtractedEntity]) -> bool {
    let mut changed = false;
    for entity in extracted {
        if entity.name.trim().is_empty() {
            continue;
        }
        let properties: Vec<EntityProperty> = entity
            .properties
            .iter()
            .filter(|p| !p.name.trim().is_empty())
            .map(|p| EntityProperty {
                name: p.name.trim().to_string(),
                value: p.value,
            })
            .collect();
        let emoji = entity.emoji.trim();

        match known.iter_mut().find(|node| same_name(&node.name, &entity.name)) {
            Some(node) => {
                if !emoji.is_empty() && node.emoji != emoji {
                    node.emoji = emoji.to_string();
                    changed = true;
                }
                if !properties.is_empty() && node.properties != properties {
                    node.properties = properties;
                    changed = true;
                }
            }
            None => {
                let mut node = EntityNode::new(new_id(), entity.name.trim()).with_emoji(emoji);
                node.properties = properties;
                known.push(node);
                changed = true;
            }
        }
    }
    changed
}

/// Extracts the entities of the whole text and merges them into the store.
pub struct EntitiesExtractor {
    task: StructuredTask<EntitiesResult>,
    context: ExtractionContext,
    on_update: Option<UpdateCallback>,
}

impl EntitiesExtractor {
    pub fn new(context: &ExtractionContext, text: &str, on_update: Option<UpdateCallback>) -> Self {
        let store = context.store.clone();
        let partial_update = on_update.clone();
        let task = context
            .structured(entities_prompt(text), entities_schema())
            .with_fallback_domain(ProseDomain::Entities)
            .with_partial_callback(move |partial: PromptResult<EntitiesResult>| {
                let mut known = store.entity_nodes();
                if merge_entities(&mut known, &partial.result.entities) {
                    store.set_entity_nodes(known);
                    if let Some(callback) = &partial_update {
                        callback();
                    }
                }
            });
        Self {
            task,
            context: context.clone(),
            on_update,
        }
    }
}

#[async_trait]
impl PromptTask for EntitiesExtractor {
    type Output = PromptResult<EntitiesResult>;

    async fn execute(&self) -> Result<Self::Output, TaskError> {
        let result = self.task.execute().await?;
        let mut known = self.context.store.entity_nodes();
        merge_entities(&mut known, &result.result.entities);
        debug!(entities = known.len(), "Entities extracted");
        self.context.store.set_entity_nodes(known);
        if let Some(callback) = &self.on_update {
            callback();
        }
        Ok(result)
    }
}
