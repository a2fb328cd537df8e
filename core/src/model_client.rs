//! Model client (spec §4.D): `chat(messages, params) -> text` and
//! `chat_stream(messages, params) -> stream of chunks` over an
//! OpenAI-compatible chat-completions endpoint. Grounded on the teacher's
//! `chat_completions::stream_chat_completions`/`process_chat_sse` for the
//! wire mapping and SSE decoding, with the retry loop removed — spec §4.D
//! states transport failures raise immediately with no retry at this layer.

use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::CoreError;
use crate::error::Result;
use crate::message::Message;
use crate::message::Role;

#[derive(Debug, Clone, Serialize)]
pub struct ChatParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_s: u64,
}

#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub content: String,
    pub done: bool,
    pub metadata: Option<Value>,
}

pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ModelClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn messages_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                json!({
                    "role": role_str(m.role),
                    "content": m.text(),
                })
            })
            .collect()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_builder(&self, payload: &Value) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(self.endpoint()).json(payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Blocking (non-streaming) chat call: returns the full assistant text.
    pub async fn chat(&self, messages: &[Message], params: &ChatParams) -> Result<String> {
        let payload = json!({
            "model": params.model,
            "messages": Self::messages_json(messages),
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": false,
        });

        let response = self
            .request_builder(&payload)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Network(format!("HTTP {status}: {body}")));
        }

        let body: Value = response.json().await.map_err(|e| CoreError::Network(e.to_string()))?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CoreError::Network("response had no choices[0].message.content".to_string()))
    }

    /// Streaming chat call: returns a lazy sequence of chunks. Cancellation
    /// is cooperative — dropping the returned stream closes the underlying
    /// transport.
    pub async fn chat_stream(
        &self,
        messages: &[Message],
        params: &ChatParams,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>> {
        let payload = json!({
            "model": params.model,
            "messages": Self::messages_json(messages),
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": true,
        });

        let response = self
            .request_builder(&payload)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Network(format!("HTTP {status}: {body}")));
        }

        let byte_stream = response.bytes_stream().map_err(|e| CoreError::Network(e.to_string()));
        Ok(Box::pin(decode_sse(byte_stream)))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn decode_sse<S>(stream: S) -> impl Stream<Item = Result<ChatChunk>>
where
    S: Stream<Item = Result<bytes::Bytes>> + Unpin,
{
    async_stream::stream! {
        let mut es = stream.eventsource();
        while let Some(event) = es.next().await {
            let event = match event {
                Ok(ev) => ev,
                Err(e) => {
                    yield Err(CoreError::Network(format!("stream error: {e}")));
                    return;
                }
            };
            if event.data.trim() == "[DONE]" {
                yield Ok(ChatChunk { content: String::new(), done: true, metadata: None });
                return;
            }
            let chunk: Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let choice = chunk.get("choices").and_then(|c| c.get(0));
            let delta_text = choice
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let finished = choice
                .and_then(|c| c.get("finish_reason"))
                .and_then(Value::as_str)
                .is_some();
            if !delta_text.is_empty() {
                yield Ok(ChatChunk {
                    content: delta_text.to_string(),
                    done: false,
                    metadata: None,
                });
            }
            if finished {
                yield Ok(ChatChunk { content: String::new(), done: true, metadata: None });
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Priority;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    #[tokio::test]
    async fn chat_returns_assistant_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hello there"}}]
            })))
            .mount(&server)
            .await;

        let client = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let params = ChatParams {
            model: "test-model".to_string(),
            temperature: 0.2,
            max_tokens: 256,
            timeout_s: 30,
        };
        let messages = vec![Message::user("hi", Priority::Recent)];
        let text = client.chat(&messages, &params).await.expect("chat");
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn chat_surfaces_http_error_status_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ModelClient::new(server.uri(), None, std::time::Duration::from_secs(5)).expect("client");
        let params = ChatParams {
            model: "test-model".to_string(),
            temperature: 0.0,
            max_tokens: 16,
            timeout_s: 30,
        };
        let messages = vec![Message::user("hi", Priority::Recent)];
        let err = client.chat(&messages, &params).await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
    }
}
