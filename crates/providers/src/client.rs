//! Completion client: the single place the task layer talks to a backend.
//!
//! Holds the active provider profile and credential, and exposes unary and
//! streaming completion. Profile and credential are shared mutable state:
//! switching either affects only requests issued after the switch.

use futures::Stream;
use narragraph_core::error::ProviderError;
use narragraph_core::provider::{
    ChunkReceiver, CompletionRequest, CompletionResponse, CompletionTransport, ProviderId,
};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::openai_compat::OpenAiCompatTransport;
use crate::profile::{self, ProviderProfile};

/// Builds a transport for a profile, endpoint and secret.
pub type TransportFactory =
    Arc<dyn Fn(&ProviderProfile, &str, &str) -> Arc<dyn CompletionTransport> + Send + Sync>;

/// Transport-level options that are not part of a profile.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Replacement base endpoints per provider
    pub endpoint_overrides: HashMap<ProviderId, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            endpoint_overrides: HashMap::new(),
        }
    }
}

impl ClientOptions {
    /// Build options from the application configuration.
    pub fn from_config(config: &narragraph_config::AppConfig) -> Self {
        let endpoint_overrides = ProviderId::ALL
            .into_iter()
            .filter_map(|id| config.api_url_for(id).map(|url| (id, url)))
            .collect();
        Self {
            timeout: Duration::from_secs(config.http.timeout_secs),
            endpoint_overrides,
        }
    }
}

struct ClientState {
    profile: &'static ProviderProfile,
    credential: Option<String>,
    transport: Option<Arc<dyn CompletionTransport>>,
}

/// Provider-switchable completion client.
pub struct CompletionClient {
    state: RwLock<ClientState>,
    options: ClientOptions,
    factory: TransportFactory,
}

impl CompletionClient {
    /// Create an uninitialized client for a provider using the HTTP transport.
    pub fn new(provider: ProviderId, options: ClientOptions) -> Self {
        let timeout = options.timeout;
        let factory: TransportFactory = Arc::new(
            move |profile: &ProviderProfile, endpoint: &str, secret: &str| {
                let transport: Arc<dyn CompletionTransport> = Arc::new(OpenAiCompatTransport::new(
                    profile.id.as_str(),
                    endpoint,
                    profile.auth,
                    secret,
                    timeout,
                ));
                transport
            },
        );
        Self::with_factory(provider, options, factory)
    }

    /// Create an uninitialized client with a custom transport factory.
    pub fn with_factory(provider: ProviderId, options: ClientOptions, factory: TransportFactory) -> Self {
        Self {
            state: RwLock::new(ClientState {
                profile: profile::profile(provider),
                credential: None,
                transport: None,
            }),
            options,
            factory,
        }
    }

    /// Switch the active profile, keeping any credential already set.
    ///
    /// With a credential present the transport is rebuilt immediately, so
    /// endpoint, auth and defaults switch together for later requests.
    pub fn set_provider(&self, provider: ProviderId) {
        let mut state = self.write_state();
        state.profile = profile::profile(provider);
        if let Some(secret) = state.credential.clone() {
            state.transport = Some(self.build_transport(state.profile, &secret));
        }
        info!(provider = %provider, initialized = state.transport.is_some(), "Provider selected");
    }

    /// Store a credential and (re)build the transport.
    pub fn set_credential(&self, secret: impl Into<String>) {
        let secret = secret.into();
        let mut state = self.write_state();
        state.transport = Some(self.build_transport(state.profile, &secret));
        state.credential = Some(secret);
        debug!(provider = %state.profile.id, "Credential set");
    }

    pub fn current_provider(&self) -> ProviderId {
        self.read_state().profile.id
    }

    pub fn profile(&self) -> &'static ProviderProfile {
        self.read_state().profile
    }

    pub fn is_initialized(&self) -> bool {
        self.read_state().transport.is_some()
    }

    pub fn default_model(&self) -> String {
        self.profile().default_model.to_string()
    }

    pub fn default_temperature(&self) -> f32 {
        self.profile().default_temperature
    }

    pub fn default_max_tokens(&self) -> u32 {
        self.profile().default_max_tokens
    }

    /// One non-streaming completion call.
    pub async fn complete(
        &self,
        mut request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let transport = self.transport()?;
        request.stream = false;
        transport.complete(request).await
    }

    /// A streaming completion call.
    pub async fn complete_stream(
        &self,
        mut request: CompletionRequest,
    ) -> Result<FragmentStream, ProviderError> {
        let transport = self.transport()?;
        request.stream = true;
        let rx = transport.stream(request).await?;
        Ok(FragmentStream::new(rx))
    }

    fn transport(&self) -> Result<Arc<dyn CompletionTransport>, ProviderError> {
        self.read_state()
            .transport
            .clone()
            .ok_or(ProviderError::NotInitialized)
    }

    fn build_transport(&self, profile: &ProviderProfile, secret: &str) -> Arc<dyn CompletionTransport> {
        let endpoint = self
            .options
            .endpoint_overrides
            .get(&profile.id)
            .map(String::as_str)
            .unwrap_or(profile.base_url);
        (self.factory)(profile, endpoint, secret)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ClientState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ClientState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A single-consumer, finite, non-restartable sequence of content fragments.
///
/// Ends when the transport sends its terminal chunk or closes the channel.
/// Dropping the stream closes the channel; the transport's reader task
/// notices on its next send and stops.
pub struct FragmentStream {
    inner: ReceiverStream<Result<narragraph_core::StreamChunk, ProviderError>>,
    finished: bool,
}

impl FragmentStream {
    pub fn new(rx: ChunkReceiver) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            finished: false,
        }
    }

    /// The next content fragment, `None` once the stream has ended.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ProviderError>> {
        futures::StreamExt::next(self).await
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.finished {
                return Poll::Ready(None);
            }
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.done {
                        self.finished = true;
                    }
                    match chunk.content {
                        Some(content) if !content.is_empty() => {
                            return Poll::Ready(Some(Ok(content)));
                        }
                        _ => continue,
                    }
                }
            }
        }
    }
}
