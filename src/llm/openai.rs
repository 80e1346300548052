//! OpenAI-compatible chat-completion client
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, vLLM, OpenRouter). Streaming uses the SSE chunk protocol with the
//! `[DONE]` sentinel; fragments are forwarded one at a time without buffering.

use super::{CompletionBackend, LlmError, TokenStream};
use crate::config::OpenAiConfig;
use crate::store::Message;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Build a client from configuration, resolving the API key from the
    /// configured environment variable.
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
            request_timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn request_body(&self, messages: &[Message], stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "frequency_penalty": self.frequency_penalty,
            "presence_penalty": self.presence_penalty,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&self.request_body(messages, false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("response carries no choices".to_string()))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let request = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, true));

        let mut source = EventSource::new(request)
            .map_err(|e| LlmError::Request(format!("cannot open event source: {e}")))?;

        let (tx, rx) = mpsc::channel(32);
        let idle_timeout = self.request_timeout;

        tokio::spawn(async move {
            forward_stream(&mut source, &tx, idle_timeout).await;
            source.close();
        });

        Ok(rx)
    }
}

/// Pump SSE chunks into content tokens until the `[DONE]` sentinel, the end
/// of the stream, or `idle_timeout` passing without any event from the
/// backend. An idle expiry delivers [`LlmError::Timeout`] and stops the pump;
/// a healthy stream that keeps emitting is never cut off.
async fn forward_stream<S>(
    source: &mut S,
    tx: &mpsc::Sender<Result<String, LlmError>>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<Event, reqwest_eventsource::Error>> + Unpin,
{
    loop {
        let event = match tokio::time::timeout(idle_timeout, source.next()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                let _ = tx.send(Err(LlmError::Timeout)).await;
                break;
            }
        };
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(message)) => {
                if message.data == "[DONE]" {
                    break;
                }
                let chunk: StreamChunk = match serde_json::from_str(&message.data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmError::MalformedResponse(format!(
                                "bad stream chunk: {e}"
                            ))))
                            .await;
                        break;
                    }
                };
                let token = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                if !token.is_empty() && tx.send(Ok(token)).await.is_err() {
                    // Consumer went away; stop pulling from the model.
                    break;
                }
            }
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(e) => {
                let _ = tx.send(Err(LlmError::Stream(e.to_string()))).await;
                break;
            }
        }
    }
}
