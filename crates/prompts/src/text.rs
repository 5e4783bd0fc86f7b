//! Free-text task: stream a completion and return the accumulated text.

use async_trait::async_trait;
use narragraph_core::{CompletionRequest, TaskError};
use narragraph_providers::{CompletionClient, ProviderProfile};
use std::sync::Arc;
use tracing::debug;

use crate::task::{ExecutablePrompt, PartialCallback, PromptResult, PromptTask};

/// Build the streaming request for a prompt, taking unset values from a
/// snapshot of the active profile.
pub(crate) fn build_request(
    profile: &ProviderProfile,
    prompt: &ExecutablePrompt,
    content: String,
) -> CompletionRequest {
    let model = prompt
        .model
        .clone()
        .unwrap_or_else(|| profile.default_model.to_string());
    let temperature = prompt.temperature.unwrap_or(profile.default_temperature);
    let max_tokens = prompt.max_tokens.unwrap_or(profile.default_max_tokens);
    CompletionRequest::streaming_user(model, content, temperature, max_tokens)
}

/// Streams one completion. Failures are not retried.
pub struct TextTask {
    client: Arc<CompletionClient>,
    prompt: ExecutablePrompt,
    on_partial: Option<PartialCallback<String>>,
}

impl TextTask {
    pub fn new(client: Arc<CompletionClient>, prompt: ExecutablePrompt) -> Self {
        Self {
            client,
            prompt,
            on_partial: None,
        }
    }

    /// Receive the accumulated text after every fragment.
    pub fn with_partial_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(PromptResult<String>) + Send + Sync + 'static,
    {
        self.on_partial = Some(Arc::new(callback));
        self
    }
}

#[async_trait]
impl PromptTask for TextTask {
    type Output = PromptResult<String>;

    async fn execute(&self) -> Result<Self::Output, TaskError> {
        let request = build_request(self.client.profile(), &self.prompt, self.prompt.prompt.clone());
        let mut stream = self.client.complete_stream(request).await?;

        let mut text = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            text.push_str(&fragment?);
            if let Some(callback) = &self.on_partial {
                callback(PromptResult::new(text.clone()));
            }
        }
        debug!(chars = text.chars().count(), "Text task finished");
        Ok(PromptResult::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narragraph_core::{ProviderError, ProviderId};
    use narragraph_providers::{ClientOptions, ScriptedTransport, scripted_factory};
    use std::sync::Mutex;

    fn client(transport: &Arc<ScriptedTransport>, provider: ProviderId) -> Arc<CompletionClient> {
        let client = CompletionClient::with_factory(
            provider,
            ClientOptions::default(),
            scripted_factory(transport.clone()),
        );
        client.set_credential("test-key");
        Arc::new(client)
    }

    #[tokio::test]
    async fn accumulates_fragments_and_reports_progress() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments(["Once ", "upon ", "a time."]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let task = TextTask::new(client(&transport, ProviderId::OpenAi), ExecutablePrompt::new("Tell a story"))
            .with_partial_callback(move |partial| sink.lock().unwrap().push(partial.result));
        let result = task.execute().await.unwrap();

        assert_eq!(result.result, "Once upon a time.");
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Once ", "Once upon ", "Once upon a time."]
        );
    }

    #[tokio::test]
    async fn uses_provider_defaults_unless_pinned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_fragments(["a"]);
        transport.push_fragments(["b"]);
        let client = client(&transport, ProviderId::ChatGlm);

        TextTask::new(client.clone(), ExecutablePrompt::new("p"))
            .execute()
            .await
            .unwrap();
        TextTask::new(client, ExecutablePrompt::new("p").with_model("glm-4-air").with_max_tokens(64))
            .execute()
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].model, "glm-4.5");
        assert_eq!(requests[0].max_tokens, 1024);
        assert!(requests[0].stream);
        assert!(requests[0].response_format.is_none());
        assert_eq!(requests[1].model, "glm-4-air");
        assert_eq!(requests[1].max_tokens, 64);
        assert_eq!(requests[0].messages[0].content, "p");
    }

    #[tokio::test]
    async fn stream_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_interrupted(["half"], "reset by peer");
        transport.push_fragments(["never used"]);

        let err = TextTask::new(client(&transport, ProviderId::OpenAi), ExecutablePrompt::new("p"))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::Provider(ProviderError::StreamInterrupted(_))
        ));
        assert_eq!(transport.calls(), 1);
    }
}
