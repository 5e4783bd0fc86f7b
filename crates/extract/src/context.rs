//! Shared collaborators for every extractor.

use narragraph_core::{EventLog, NarrativeGraphStore, SilentEventLog, TracingEventLog};
use narragraph_prompts::{ExecutablePrompt, FallbackRegistry, RetryPolicy, Schema, StructuredTask};
use narragraph_providers::CompletionClient;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Callback fired whenever an extractor has changed the graph.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Client, graph store and task settings shared by the extractors.
#[derive(Clone)]
pub struct ExtractionContext {
    pub client: Arc<CompletionClient>,
    pub store: Arc<dyn NarrativeGraphStore>,
    pub events: Arc<dyn EventLog>,
    pub retry: RetryPolicy,
    pub fallback: Arc<FallbackRegistry>,
    /// Model pinned for every prompt instead of the provider default
    pub model: Option<String>,
}

impl ExtractionContext {
    pub fn new(client: Arc<CompletionClient>, store: Arc<dyn NarrativeGraphStore>) -> Self {
        Self {
            client,
            store,
            events: Arc::new(TracingEventLog),
            retry: RetryPolicy::default(),
            fallback: Arc::new(FallbackRegistry::default()),
            model: None,
        }
    }

    /// Settings taken from the application configuration.
    pub fn from_config(
        client: Arc<CompletionClient>,
        store: Arc<dyn NarrativeGraphStore>,
        config: &narragraph_config::AppConfig,
    ) -> Self {
        let events: Arc<dyn EventLog> = if config.telemetry.enabled {
            Arc::new(TracingEventLog)
        } else {
            Arc::new(SilentEventLog)
        };
        Self {
            events,
            retry: RetryPolicy::from_config(&config.tasks),
            ..Self::new(client, store)
        }
    }

    pub fn with_event_log(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// A structured task wired to this context's client and settings.
    pub(crate) fn structured<T>(&self, prompt: String, schema: Schema) -> StructuredTask<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut prompt = ExecutablePrompt::new(prompt);
        if let Some(model) = &self.model {
            prompt = prompt.with_model(model.clone());
        }
        StructuredTask::new(self.client.clone(), prompt, schema)
            .with_event_log(self.events.clone())
            .with_retry(self.retry)
            .with_fallback_registry(self.fallback.clone())
    }
}

/// Case-insensitive name comparison used for every merge.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use narragraph_core::ProviderId;
    use narragraph_prompts::PromptTask;
    use narragraph_providers::{ClientOptions, ScriptedTransport, scripted_factory};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Answer {
        ok: bool,
    }

    fn context(transport: Arc<ScriptedTransport>) -> ExtractionContext {
        let client = CompletionClient::with_factory(
            ProviderId::ChatGlm,
            ClientOptions::default(),
            scripted_factory(transport),
        );
        client.set_credential("k");
        ExtractionContext::new(Arc::new(client), Arc::new(InMemoryGraphStore::new()))
            .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn pinned_model_overrides_provider_default() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"{"ok": true}"#]);
        transport.push_fragments([r#"{"ok": true}"#]);
        let schema = Schema::object([("ok", Schema::Boolean)]);

        let plain = context(transport.clone());
        let pinned = plain.clone().with_model("glm-4-flash");
        let first: narragraph_prompts::PromptResult<Answer> =
            plain.structured("Q".into(), schema.clone()).execute().await.unwrap();
        pinned
            .structured::<Answer>("Q".into(), schema)
            .execute()
            .await
            .unwrap();

        assert!(first.result.ok);
        let requests = transport.requests();
        assert_eq!(requests[0].model, "glm-4.5");
        assert_eq!(requests[1].model, "glm-4-flash");
    }

    #[test]
    fn names_compare_case_insensitively() {
        assert!(same_name(" Alice", "ALICE "));
        assert!(!same_name("Alice", "Alicia"));
    }
}
