//! `narragraph extract`: Build the narrative graph of a text file.
//!
//! Runs entities extraction over the whole text, one change-detector
//! refresh (actions per sentence), then locations extraction, and prints
//! what ended up in the store.

use narragraph_config::{AppConfig, provider_env_var};
use narragraph_core::{Error, NarrativeGraphStore, ProviderId, Result};
use narragraph_extract::{
    ChangeDetector, DetectorDeps, EntitiesExtractor, ExtractionContext, GraphSnapshot,
    InMemoryGraphStore, LocationsExtractor, NoopLayout, RefreshOutcome,
};
use narragraph_prompts::PromptTask;
use narragraph_providers::{ClientOptions, CompletionClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn run(
    file: PathBuf,
    provider: Option<String>,
    model: Option<String>,
    json: bool,
) -> Result<()> {
    let config = AppConfig::load()?;
    let provider: ProviderId = match provider {
        Some(id) => id.parse()?,
        None => config.provider_id()?,
    };
    let text = std::fs::read_to_string(&file).map_err(|source| Error::Read {
        path: file.clone(),
        source,
    })?;

    let api_key = config.api_key_for(provider).ok_or_else(|| Error::Config {
        message: format!(
            "no API key for provider '{provider}'. Set {} or add it to {}",
            provider_env_var(provider),
            AppConfig::config_dir().join("config.toml").display()
        ),
    })?;
    let client = CompletionClient::new(provider, ClientOptions::from_config(&config));
    client.set_credential(api_key);

    let store = Arc::new(InMemoryGraphStore::with_text(text.clone()));
    let mut context = ExtractionContext::from_config(Arc::new(client), store.clone(), &config);
    if let Some(model) = model {
        context = context.with_model(model);
    }

    info!(provider = %provider, file = %file.display(), chars = text.chars().count(), "Extracting narrative graph");

    EntitiesExtractor::new(&context, &text, None).execute().await?;
    info!(entities = store.entity_nodes().len(), "Entities extracted");

    let detector = ChangeDetector::create(
        DetectorDeps::new(context.clone(), Arc::new(NoopLayout))
            .with_min_sentence_chars(config.segmenter.min_sentence_chars),
    );
    if let RefreshOutcome::Started(handle) = detector.refresh_from_text(&text, None, None)? {
        let report = handle.wait().await?;
        info!(units = report.units.len(), actions = store.action_edges().len(), "Actions extracted");
    }
    detector.dispose();

    LocationsExtractor::new(&context, &text, None).execute().await?;
    info!(locations = store.location_nodes().len(), "Locations extracted");

    let snapshot = store.snapshot();
    if json {
        println!("{}", render_json(&snapshot)?);
    } else {
        print!("{}", render_graph(&snapshot));
    }

    Ok(())
}

fn render_json(snapshot: &GraphSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "entities": snapshot.entities,
        "locations": snapshot.locations,
        "actions": snapshot.actions,
    }))
}

fn render_graph(snapshot: &GraphSnapshot) -> String {
    let name_of = |id: &str| {
        snapshot
            .entities
            .iter()
            .find(|e| e.id == id)
            .map_or_else(|| id.to_string(), |e| e.name.clone())
    };

    let mut out = format!("👥 Entities ({})\n", snapshot.entities.len());
    for entity in &snapshot.entities {
        let properties: Vec<String> = entity
            .properties
            .iter()
            .map(|p| format!("{}: {}", p.name, p.value))
            .collect();
        out.push_str(&format!("  {} {}", entity.emoji, entity.name));
        if !properties.is_empty() {
            out.push_str(&format!(" ({})", properties.join(", ")));
        }
        out.push('\n');
    }

    out.push_str(&format!("\n📍 Locations ({})\n", snapshot.locations.len()));
    for location in &snapshot.locations {
        out.push_str(&format!("  {} {}\n", location.emoji, location.name));
    }

    out.push_str(&format!("\n⚡ Actions ({})\n", snapshot.actions.len()));
    for action in &snapshot.actions {
        out.push_str(&format!(
            "  {} —[{}]→ {}",
            name_of(&action.source),
            action.data.name,
            name_of(&action.target)
        ));
        let place = match (
            action.data.source_location.as_str(),
            action.data.target_location.as_str(),
        ) {
            ("", "") => String::new(),
            (from, to) if from == to || to.is_empty() => format!(" @ {from}"),
            ("", to) => format!(" @ {to}"),
            (from, to) => format!(" @ {from} → {to}"),
        };
        out.push_str(&place);
        out.push_str(&format!("\n      \"{}\"\n", action.data.passage));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use narragraph_core::{ActionData, ActionEdge, EntityNode, EntityProperty, LocationNode};

    fn snapshot() -> GraphSnapshot {
        let mut alice = EntityNode::new("e1", "Alice").with_emoji("👧");
        alice.properties.push(EntityProperty {
            name: "courage".into(),
            value: 7,
        });
        GraphSnapshot {
            text: "Alice gave Bob the map in the library.".into(),
            entities: vec![alice, EntityNode::new("e2", "Bob").with_emoji("🧔")],
            locations: vec![LocationNode::new("l1", "Library", "📚")],
            actions: vec![ActionEdge {
                id: "a1".into(),
                source: "e1".into(),
                target: "e2".into(),
                data: ActionData {
                    name: "gives map to".into(),
                    passage: "Alice gave Bob the map".into(),
                    source_location: "Library".into(),
                    target_location: "Library".into(),
                },
            }],
            ..GraphSnapshot::default()
        }
    }

    #[test]
    fn graph_table_resolves_entity_names() {
        let out = render_graph(&snapshot());
        assert!(out.contains("👥 Entities (2)"));
        assert!(out.contains("👧 Alice (courage: 7)"));
        assert!(out.contains("Alice —[gives map to]→ Bob @ Library"));
        assert!(out.contains("\"Alice gave Bob the map\""));
    }

    #[test]
    fn json_output_omits_view_state() {
        let value: serde_json::Value =
            serde_json::from_str(&render_json(&snapshot()).unwrap()).unwrap();
        assert_eq!(value["entities"][0]["name"], "Alice");
        assert_eq!(value["actions"][0]["data"]["sourceLocation"], "Library");
        assert!(value.get("text").is_none());
        assert!(value.get("selected_nodes").is_none());
    }
}
