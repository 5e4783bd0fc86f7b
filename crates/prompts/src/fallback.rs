//! Heuristic parsers for providers that sometimes answer in prose.
//!
//! Selection is by provider id and by the domain the task declares, never
//! by sniffing the response text, so a locations task can never be parsed
//! as entities.

use narragraph_core::ProviderId;
use narragraph_providers::profile;
use regex_lite::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;

static LOCATION_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.\s*\*\*([^*]+)\*\*\s*-\s*([^\n]+)").expect("valid location item regex")
});
static ENTITY_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s*\*\*Entity:\*\*").expect("valid entity block regex"));
static PROPERTY_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"- ([^:]+):\s*(\d+)").expect("valid property line regex"));

/// What a task expects to find in a prose answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProseDomain {
    /// `N. **Name** - emoji` list items
    Locations,
    /// `N. **Entity:**` blocks with an emoji line and `- property: value` lines
    Entities,
}

/// Turns a prose answer into a schema-shaped value, `None` if nothing matched.
pub type ProseParser = fn(&str) -> Option<Value>;

/// Prose parsers keyed by provider and domain.
#[derive(Clone)]
pub struct FallbackRegistry {
    parsers: HashMap<(ProviderId, ProseDomain), ProseParser>,
}

impl Default for FallbackRegistry {
    /// Registers both parsers for every provider whose profile says it
    /// answers in prose.
    fn default() -> Self {
        let mut registry = Self::empty();
        for profile in profile::all_profiles() {
            if profile.answers_in_prose {
                registry.register(profile.id, ProseDomain::Locations, parse_locations);
                registry.register(profile.id, ProseDomain::Entities, parse_entities);
            }
        }
        registry
    }
}

impl FallbackRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: ProviderId, domain: ProseDomain, parser: ProseParser) {
        self.parsers.insert((provider, domain), parser);
    }

    pub fn lookup(&self, provider: ProviderId, domain: ProseDomain) -> Option<ProseParser> {
        self.parsers.get(&(provider, domain)).copied()
    }

    /// Run the registered parser, if any.
    pub fn parse(&self, provider: ProviderId, domain: ProseDomain, response: &str) -> Option<Value> {
        self.lookup(provider, domain).and_then(|parser| parser(response))
    }
}

impl std::fmt::Debug for FallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRegistry")
            .field("registered", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `1. **Tavern** - 🍺` → `{"locations": [{"name": "Tavern", "emoji": "🍺"}]}`
pub fn parse_locations(response: &str) -> Option<Value> {
    let locations: Vec<Value> = LOCATION_ITEM_RE
        .captures_iter(response)
        .map(|caps| {
            json!({
                "name": caps[2].trim(),
                "emoji": caps[3].trim(),
            })
        })
        .collect();
    if locations.is_empty() {
        return None;
    }
    Some(json!({ "locations": locations }))
}

/// Blocks introduced by `N. **Entity:**`, each with the name on the first
/// line, `**Emoji:** x` on the second, then `- property: integer` lines.
pub fn parse_entities(response: &str) -> Option<Value> {
    let mut entities = Vec::new();
    for block in ENTITY_BLOCK_RE.split(response).skip(1) {
        let lines: Vec<&str> = block.trim().split('\n').collect();
        if lines.len() < 3 {
            continue;
        }
        let name = lines[0].trim();
        let emoji = lines[1].replace("**Emoji:**", "");
        let properties: Vec<Value> = lines[2..]
            .iter()
            .filter_map(|line| PROPERTY_LINE_RE.captures(line))
            .filter_map(|caps| {
                let value: i64 = caps[2].parse().ok()?;
                Some(json!({ "name": caps[1].trim(), "value": value }))
            })
            .collect();
        entities.push(json!({
            "name": name,
            "emoji": emoji.trim(),
            "properties": properties,
        }));
    }
    if entities.is_empty() {
        return None;
    }
    Some(json!({ "entities": entities }))
}
