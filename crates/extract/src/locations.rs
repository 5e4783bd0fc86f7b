//! Whole-text location extraction.

use async_trait::async_trait;
use narragraph_core::{LocationNode, NarrativeGraphStore, TaskError};
use narragraph_prompts::{PromptResult, PromptTask, ProseDomain, Schema, StructuredTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::context::{ExtractionContext, UpdateCallback, new_id, same_name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLocation {
    pub name: String,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationsResult {
    pub locations: Vec<ExtractedLocation>,
}

pub fn locations_schema() -> Schema {
    Schema::object([(
        "locations",
        Schema::array(Schema::object([
            ("name", Schema::String),
            ("emoji", Schema::String),
        ])),
    )])
}

fn locations_prompt(text: &str, referenced: &[String]) -> String {
    let referenced = if referenced.is_empty() {
        "(none yet)".to_string()
    } else {
        referenced.join(", ")
    };
    format!(
        "Read the story below and list the locations where its events take place.\n\n\
         \"\"\"{text}\"\"\"\n\n\
         Locations already referenced by actions: {referenced}\n\
         Use exactly those names when they are meant. For each location give `name` and \
         `emoji` (one emoji that represents it).\n\
         Answer as JSON: {{\"locations\": [...]}}"
    )
}

/// Merge extracted locations by case-insensitive name; a non-empty emoji
/// from the model replaces the stored one.
pub fn merge_locations(known: &mut Vec<LocationNode>, extracted: &[ExtractedLocation]) -> bool {
    let mut changed = false;
    for location in extracted {
        let name = location.name.trim();
        if name.is_empty() {
            continue;
        }
        let emoji = location.emoji.trim();
        match known.iter_mut().find(|node| same_name(&node.name, name)) {
            Some(node) => {
                if !emoji.is_empty() && node.emoji != emoji {
                    node.emoji = emoji.to_string();
                    changed = true;
                }
            }
            None => {
                known.push(LocationNode::new(new_id(), name, emoji));
                changed = true;
            }
        }
    }
    changed
}

/// Extracts the locations of the whole text and merges them into the store.
pub struct LocationsExtractor {
    task: StructuredTask<LocationsResult>,
    context: ExtractionContext,
    on_update: Option<UpdateCallback>,
}

impl LocationsExtractor {
    pub fn new(context: &ExtractionContext, text: &str, on_update: Option<UpdateCallback>) -> Self {
        let referenced: Vec<String> = context
            .store
            .action_edges()
            .iter()
            .flat_map(|edge| [edge.data.source_location.clone(), edge.data.target_location.clone()])
            .filter(|name| !name.trim().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let store = context.store.clone();
        let partial_update = on_update.clone();
        let task = context
            .structured(locations_prompt(text, &referenced), locations_schema())
            .with_fallback_domain(ProseDomain::Locations)
            .with_partial_callback(move |partial: PromptResult<LocationsResult>| {
                let mut known = store.location_nodes();
                if merge_locations(&mut known, &partial.result.locations) {
                    store.set_location_nodes(known);
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
impl PromptTask for LocationsExtractor {
    type Output = PromptResult<LocationsResult>;

    async fn execute(&self) -> Result<Self::Output, TaskError> {
        let result = self.task.execute().await?;
        let mut known = self.context.store.location_nodes();
        merge_locations(&mut known, &result.result.locations);
        debug!(locations = known.len(), "Locations extracted");
        self.context.store.set_location_nodes(known);
        if let Some(callback) = &self.on_update {
            callback();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use narragraph_core::{ActionData, ActionEdge, ProviderId};
    use narragraph_prompts::RetryPolicy;
    use narragraph_providers::{ClientOptions, CompletionClient, ScriptedTransport, scripted_factory};
    use std::sync::Arc;

    #[test]
    fn merge_fills_emoji_of_known_location() {
        let mut known = vec![LocationNode::new("l1", "Old Mill", "")];
        let changed = merge_locations(
            &mut known,
            &[
                ExtractedLocation {
                    name: "old mill".into(),
                    emoji: "🏚️".into(),
                },
                ExtractedLocation {
                    name: "River".into(),
                    emoji: "🌊".into(),
                },
            ],
        );
        assert!(changed);
        assert_eq!(known[0].id, "l1");
        assert_eq!(known[0].emoji, "🏚️");
        assert_eq!(known[1].name, "River");
    }

    #[tokio::test]
    async fn prompt_lists_referenced_locations() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"{"locations": [{"name": "Kitchen", "emoji": "🍳"}]}"#]);
        let client = CompletionClient::with_factory(
            ProviderId::ChatGlm,
            ClientOptions::default(),
            scripted_factory(transport.clone()),
        );
        client.set_credential("k");
        let store = Arc::new(InMemoryGraphStore::new());
        store.set_action_edges(vec![ActionEdge {
            id: "a1".into(),
            source: "e1".into(),
            target: "e2".into(),
            data: ActionData {
                name: "cooks for".into(),
                passage: "Mia cooks for Leo".into(),
                source_location: "Kitchen".into(),
                target_location: "Kitchen".into(),
            },
        }]);
        store.set_location_nodes(vec![LocationNode::new("l1", "Kitchen", "")]);
        let context =
            ExtractionContext::new(Arc::new(client), store.clone()).with_retry(RetryPolicy::none());

        LocationsExtractor::new(&context, "Mia cooks for Leo.", None)
            .execute()
            .await
            .unwrap();

        let prompt = &transport.requests()[0].messages[0].content;
        assert!(prompt.contains("Locations already referenced by actions: Kitchen\n"));
        let locations = store.location_nodes();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].emoji, "🍳");
    }
}
