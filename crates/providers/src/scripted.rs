//! Scripted transport for tests: replays queued responses instead of
//! calling the network.

use async_trait::async_trait;
use narragraph_core::error::ProviderError;
use narragraph_core::provider::{
    ChunkReceiver, CompletionRequest, CompletionResponse, CompletionTransport, ProviderId,
    StreamChunk,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::TransportFactory;
use crate::profile::ProviderProfile;

/// One queued response.
#[derive(Debug, Clone)]
enum Script {
    /// Fragments followed by a clean end of stream
    Fragments {
        fragments: Vec<String>,
        delay: Duration,
    },
    /// Fragments followed by a mid-stream failure
    Interrupted {
        fragments: Vec<String>,
        reason: String,
    },
    /// The request itself fails
    Fail(ProviderError),
}

/// A transport that returns queued scripts in order.
///
/// Every request is recorded. Once the queue is empty, calls fail with a
/// 500 `ApiError`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
    built: Mutex<Vec<(ProviderId, String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response streamed as the given fragments.
    pub fn push_fragments<I, S>(&self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_delayed(fragments, Duration::ZERO);
    }

    /// Queue a response whose first fragment arrives after `delay`.
    pub fn push_delayed<I, S>(&self, fragments: I, delay: Duration)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Script::Fragments {
            fragments: fragments.into_iter().map(Into::into).collect(),
            delay,
        });
    }

    /// Queue a response that is cut off after the given fragments.
    pub fn push_interrupted<I, S>(&self, fragments: I, reason: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Script::Interrupted {
            fragments: fragments.into_iter().map(Into::into).collect(),
            reason: reason.to_string(),
        });
    }

    /// Queue a request-level failure.
    pub fn push_error(&self, error: ProviderError) {
        self.push(Script::Fail(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// `(provider, endpoint, secret)` for every time the factory built this
    /// transport.
    pub fn built_for(&self) -> Vec<(ProviderId, String, String)> {
        lock(&self.built).clone()
    }

    fn push(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    fn next_script(&self, request: CompletionRequest) -> Result<Script, ProviderError> {
        lock(&self.requests).push(request);
        lock(&self.scripts)
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "ScriptedTransport exhausted".into(),
            })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A factory that records what it was asked to build and always hands out
/// the same scripted transport.
pub fn scripted_factory(transport: Arc<ScriptedTransport>) -> TransportFactory {
    Arc::new(move |profile: &ProviderProfile, endpoint: &str, secret: &str| {
        lock(&transport.built).push((profile.id, endpoint.to_string(), secret.to_string()));
        let shared: Arc<dyn CompletionTransport> = transport.clone();
        shared
    })
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.clone();
        match self.next_script(request)? {
            Script::Fragments { fragments, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(CompletionResponse {
                    content: fragments.concat(),
                    usage: None,
                    model,
                })
            }
            Script::Interrupted { reason, .. } => Err(ProviderError::StreamInterrupted(reason)),
            Script::Fail(error) => Err(error),
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver, ProviderError> {
        let script = self.next_script(request)?;
        if let Script::Fail(error) = script {
            return Err(error);
        }

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            match script {
                Script::Fragments { fragments, delay } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    for fragment in fragments {
                        if tx.send(Ok(StreamChunk::content(fragment))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Ok(StreamChunk::done())).await;
                }
                Script::Interrupted { fragments, reason } => {
                    for fragment in fragments {
                        if tx.send(Ok(StreamChunk::content(fragment))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Err(ProviderError::StreamInterrupted(reason))).await;
                }
                Script::Fail(_) => {}
            }
        });
        Ok(rx)
    }
}
