//! Structured task: stream a completion that must coerce into a schema.
//!
//! Each attempt streams the response, surfacing schema-valid partial
//! results as they become parseable, then recovers the final value from the
//! whole response. Any failed attempt is retried from scratch with a fresh
//! request until the retry budget runs out.

use async_trait::async_trait;
use narragraph_core::{EventLog, ProviderId, ResponseFormat, TaskError, TracingEventLog};
use narragraph_providers::{CompletionClient, ProviderProfile};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fallback::{FallbackRegistry, ProseDomain};
use crate::partial::parse_partial;
use crate::recover::recover_json;
use crate::schema::Schema;
use crate::task::{ExecutablePrompt, PartialCallback, PromptResult, PromptTask, RetryPolicy};
use crate::text::build_request;

/// Name of the native structured-output directive.
const RESPONSE_FORMAT_NAME: &str = "response";

pub struct StructuredTask<T> {
    client: Arc<CompletionClient>,
    prompt: ExecutablePrompt,
    schema: Schema,
    on_partial: Option<PartialCallback<T>>,
    fallback_domain: Option<ProseDomain>,
    fallback: Arc<FallbackRegistry>,
    events: Arc<dyn EventLog>,
    retry: RetryPolicy,
    _output: PhantomData<fn() -> T>,
}

impl<T> StructuredTask<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(client: Arc<CompletionClient>, prompt: ExecutablePrompt, schema: Schema) -> Self {
        Self {
            client,
            prompt,
            schema,
            on_partial: None,
            fallback_domain: None,
            fallback: Arc::new(FallbackRegistry::default()),
            events: Arc::new(TracingEventLog),
            retry: RetryPolicy::default(),
            _output: PhantomData,
        }
    }

    /// Receive every schema-valid partial result while the response streams.
    pub fn with_partial_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(PromptResult<T>) + Send + Sync + 'static,
    {
        self.on_partial = Some(Arc::new(callback));
        self
    }

    /// Opt in to prose parsing for providers registered for `domain`.
    pub fn with_fallback_domain(mut self, domain: ProseDomain) -> Self {
        self.fallback_domain = Some(domain);
        self
    }

    pub fn with_fallback_registry(mut self, registry: Arc<FallbackRegistry>) -> Self {
        self.fallback = registry;
        self
    }

    pub fn with_event_log(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// One complete attempt: request, stream, final recovery.
    async fn attempt(&self) -> Result<T, TaskError> {
        self.events
            .log_event("PROMPT_TO_EXECUTE", json!({ "prompt": self.prompt.prompt }));

        let profile = self.client.profile();
        let request = self.request_for(profile);
        let mut stream = self.client.complete_stream(request).await?;

        let mut response = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            response.push_str(&fragment?);
            if let Some(callback) = &self.on_partial {
                if let Some(partial) = self.partial_result(&response) {
                    callback(PromptResult::new(partial));
                }
            }
        }

        self.events.log_event(
            "PROMPT_EXECUTED",
            json!({ "prompt": self.prompt.prompt, "response": response }),
        );
        debug!(provider = %profile.id, chars = response.len(), "Structured response received");

        self.final_result(profile.id, &response)
    }

    /// JSON-only instruction for prompt-instructed providers, a schema-bound
    /// response format for the rest.
    fn request_for(&self, profile: &ProviderProfile) -> narragraph_core::CompletionRequest {
        if profile.needs_prompt_augmentation() {
            let mut content = self.prompt.prompt.clone();
            if let Some(instruction) = profile.prompt_augmentation {
                content.push_str(instruction);
            }
            build_request(profile, &self.prompt, content)
        } else {
            build_request(profile, &self.prompt, self.prompt.prompt.clone()).with_response_format(
                ResponseFormat {
                    name: RESPONSE_FORMAT_NAME.into(),
                    schema: self.schema.to_json_schema(),
                    strict: true,
                },
            )
        }
    }

    /// Best-effort typed value from a possibly truncated response.
    fn partial_result(&self, response: &str) -> Option<T> {
        let value = parse_partial(response).ok()?;
        // Only containers below the root may still be truncated
        if matches!(self.schema, Schema::Object(_)) && !value.is_object() {
            return None;
        }
        self.schema.coerce_partial(&value).ok()
    }

    fn final_result(&self, provider: ProviderId, response: &str) -> Result<T, TaskError> {
        let value = recover_json(response).or_else(|| {
            let domain = self.fallback_domain?;
            let parsed = self.fallback.parse(provider, domain, response);
            if parsed.is_some() {
                debug!(provider = %provider, ?domain, "Parsed prose response");
            }
            parsed
        });
        match value {
            Some(value) => self.schema.coerce(&value),
            None => Err(TaskError::ResponseUnparsable {
                raw: response.to_string(),
            }),
        }
    }
}

#[async_trait]
impl<T> PromptTask for StructuredTask<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = PromptResult<T>;

    async fn execute(&self) -> Result<Self::Output, TaskError> {
        let mut retries = 0;
        loop {
            match self.attempt().await {
                Ok(value) => return Ok(PromptResult::new(value)),
                Err(e) if e.is_retryable() && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Structured task attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narragraph_core::{EventBus, ProviderError};
    use narragraph_providers::{ClientOptions, ScriptedTransport, scripted_factory};
    use serde::Deserialize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Tally {
        name: String,
        count: f64,
        tags: Vec<String>,
    }

    fn tally_schema() -> Schema {
        Schema::object([
            ("name", Schema::String),
            ("count", Schema::Number),
            ("tags", Schema::array(Schema::String)),
        ])
    }

    fn client(transport: &Arc<ScriptedTransport>, provider: ProviderId) -> Arc<CompletionClient> {
        let client = CompletionClient::with_factory(
            provider,
            ClientOptions::default(),
            scripted_factory(transport.clone()),
        );
        client.set_credential("test-key");
        Arc::new(client)
    }

    fn task(client: Arc<CompletionClient>) -> StructuredTask<Tally> {
        StructuredTask::new(client, ExecutablePrompt::new("Count the things"), tally_schema())
    }

    fn api_error(message: &str) -> ProviderError {
        ProviderError::ApiError {
            status_code: 503,
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn native_provider_gets_response_format() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"{"name": "x", "count": 2, "tags": ["a"]}"#]);

        let result = task(client(&transport, ProviderId::OpenAi))
            .execute()
            .await
            .unwrap();
        assert_eq!(result.result.count, 2.0);

        let request = &transport.requests()[0];
        assert_eq!(request.messages[0].content, "Count the things");
        let format = request.response_format.as_ref().unwrap();
        assert_eq!(format.name, "response");
        assert!(format.strict);
        assert_eq!(format.schema["required"], json!(["name", "count", "tags"]));
    }

    #[tokio::test]
    async fn prompt_instructed_provider_gets_augmented_prompt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments(["```json\n", r#"{"name": "x", "count": 1, "tags": []}"#, "\n```"]);

        task(client(&transport, ProviderId::Small))
            .execute()
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert!(request.response_format.is_none());
        assert!(request.messages[0].content.starts_with("Count the things\n\nCRITICAL"));
        assert_eq!(request.max_tokens, 2048);
    }

    #[tokio::test]
    async fn partial_results_are_backfilled_and_validated() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([
            "{\"na",
            "me\": \"Ann",
            "a\", \"cou",
            "nt\": 3, \"tags\": [\"x\"",
            "]}",
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let result = task(client(&transport, ProviderId::OpenAi))
            .with_partial_callback(move |partial| sink.lock().unwrap().push(partial.result))
            .execute()
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().map(|t| t.name.as_str()), Some(""));
        assert!(seen.iter().any(|t| t.name == "Anna" && t.count == 0.0));
        assert_eq!(seen.last(), Some(&result.result));
        assert_eq!(result.result.tags, vec!["x"]);
    }

    #[tokio::test]
    async fn invalid_partials_are_swallowed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"{"name": 5"#, r#", "count": 1, "tags": []}"#]);
        transport.push_fragments([r#"{"name": "ok", "count": 1, "tags": []}"#]);
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let result = task(client(&transport, ProviderId::OpenAi))
            .with_retry(RetryPolicy::none())
            .with_partial_callback(move |_| *counter.lock().unwrap() += 1)
            .execute()
            .await;

        assert!(matches!(result, Err(TaskError::SchemaValidation { .. })));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn null_final_response_fails_validation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments(["nu", "ll"]);
        let partials = Arc::new(Mutex::new(0));
        let counter = partials.clone();

        let err = task(client(&transport, ProviderId::OpenAi))
            .with_retry(RetryPolicy::none())
            .with_partial_callback(move |_| *counter.lock().unwrap() += 1)
            .execute()
            .await
            .unwrap_err();

        assert_eq!(*partials.lock().unwrap(), 0);
        assert!(matches!(err, TaskError::SchemaValidation { ref path, .. } if path == "$"));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_shaped_final_responses_are_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"[{"name": "x", "count": 1, "tags": []}]"#]);
        transport.push_fragments([r#"{"name": "x", "count": 1, "tags": "oops"}"#]);
        transport.push_fragments([r#"{"name": "x", "count": 1, "tags": ["ok"]}"#]);

        let result = task(client(&transport, ProviderId::OpenAi))
            .execute()
            .await
            .unwrap();

        assert_eq!(result.result.tags, vec!["ok"]);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn string_in_array_field_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"{"name": "x", "count": 1, "tags": "oops"}"#]);

        let err = task(client(&transport, ProviderId::OpenAi))
            .with_retry(RetryPolicy::none())
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::SchemaValidation { ref path, .. } if path == "$.tags"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_with_linear_backoff() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(api_error("first"));
        transport.push_interrupted([r#"{"name""#], "reset");
        transport.push_fragments([r#"{"name": "third", "count": 3, "tags": []}"#]);

        let started = tokio::time::Instant::now();
        let result = task(client(&transport, ProviderId::OpenAi))
            .execute()
            .await
            .unwrap();

        assert_eq!(result.result.name, "third");
        assert_eq!(transport.calls(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn third_failure_is_returned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(api_error("one"));
        transport.push_error(api_error("two"));
        transport.push_error(api_error("three"));

        let err = task(client(&transport, ProviderId::OpenAi))
            .execute()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("three"));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn uninitialized_client_is_not_retried() {
        let client = Arc::new(CompletionClient::new(ProviderId::OpenAi, ClientOptions::default()));
        let err = task(client).execute().await.unwrap_err();
        assert!(matches!(err, TaskError::Provider(ProviderError::NotInitialized)));
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_response_keeps_raw_text() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.push_fragments(["I'm sorry, I can't count that."]);
        }

        let err = task(client(&transport, ProviderId::OpenAi))
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.raw_response(), Some("I'm sorry, I can't count that."));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn brace_extraction_recovers_chatter() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"Sure! {"name": "x", "count": 1, "tags": []} Done."#]);

        let result = task(client(&transport, ProviderId::ChatGlm))
            .execute()
            .await
            .unwrap();
        assert_eq!(result.result.name, "x");
    }

    #[derive(Debug, Deserialize)]
    struct Places {
        locations: Vec<Place>,
    }

    #[derive(Debug, Deserialize)]
    struct Place {
        name: String,
        emoji: String,
    }

    fn places_schema() -> Schema {
        Schema::object([(
            "locations",
            Schema::array(Schema::object([
                ("name", Schema::String),
                ("emoji", Schema::String),
            ])),
        )])
    }

    #[tokio::test]
    async fn prose_fallback_for_registered_provider_and_domain() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments(["Locations:\n1. **Forest** - 🌲\n2. **Castle** - 🏰"]);

        let result = StructuredTask::<Places>::new(
            client(&transport, ProviderId::Small),
            ExecutablePrompt::new("List the places"),
            places_schema(),
        )
        .with_fallback_domain(ProseDomain::Locations)
        .execute()
        .await
        .unwrap();

        let names: Vec<_> = result.result.locations.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Forest", "Castle"]);
        assert_eq!(result.result.locations[1].emoji, "🏰");
    }

    #[tokio::test]
    async fn prose_fallback_is_not_used_for_other_providers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments(["1. **Forest** - 🌲"]);

        let err = StructuredTask::<Places>::new(
            client(&transport, ProviderId::OpenAi),
            ExecutablePrompt::new("List the places"),
            places_schema(),
        )
        .with_fallback_domain(ProseDomain::Locations)
        .with_retry(RetryPolicy::none())
        .execute()
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::ResponseUnparsable { .. }));
    }

    #[tokio::test]
    async fn telemetry_events_bracket_each_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments([r#"{"name": "x", "count": 1, "tags": []}"#]);
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();

        task(client(&transport, ProviderId::OpenAi))
            .with_event_log(bus.clone())
            .execute()
            .await
            .unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.name, "PROMPT_TO_EXECUTE");
        assert_eq!(first.payload["prompt"], "Count the things");
        let second = events.recv().await.unwrap();
        assert_eq!(second.name, "PROMPT_EXECUTED");
        assert_eq!(second.payload["response"], r#"{"name": "x", "count": 1, "tags": []}"#);
    }
}
