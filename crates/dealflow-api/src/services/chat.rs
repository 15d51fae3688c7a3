//! Assistant replies from an OpenAI-compatible chat-completion endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
  #[error("chat request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("chat response has no content")]
  EmptyReply,
  #[error("no chat backend configured")]
  Disabled,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
  async fn reply(&self, message: &str) -> Result<String, ChatError>;
}

fn default_model() -> String { "llama-3.3-70b-versatile".to_owned() }

fn default_temperature() -> f32 { 0.7 }

fn default_system_prompt() -> String {
  "You are a professional CRM assistant. Answer briefly, clearly and politely in English."
    .to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
  /// Base URL up to and including the API version, e.g.
  /// `https://api.groq.com/openai/v1`.
  pub base_url:      String,
  pub api_key:       String,
  #[serde(default = "default_model")]
  pub model:         String,
  #[serde(default = "default_temperature")]
  pub temperature:   f32,
  #[serde(default = "default_system_prompt")]
  pub system_prompt: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:       &'a str,
  messages:    [ChatMessage<'a>; 2],
  temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
  content: Option<String>,
}

pub struct OpenAiChat {
  client: reqwest::Client,
  config: AiConfig,
}

impl OpenAiChat {
  pub fn new(client: reqwest::Client, config: AiConfig) -> Self { Self { client, config } }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
  async fn reply(&self, message: &str) -> Result<String, ChatError> {
    let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
    let request = ChatRequest {
      model:       &self.config.model,
      messages:    [
        ChatMessage { role: "system", content: &self.config.system_prompt },
        ChatMessage { role: "user", content: message },
      ],
      temperature: self.config.temperature,
    };
    let response: ChatResponse = self
      .client
      .post(url)
      .bearer_auth(&self.config.api_key)
      .json(&request)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    response
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .filter(|text| !text.trim().is_empty())
      .ok_or(ChatError::EmptyReply)
  }
}

/// Used when no AI backend is configured.
pub struct DisabledChat;

#[async_trait]
impl ChatCompletion for DisabledChat {
  async fn reply(&self, _message: &str) -> Result<String, ChatError> { Err(ChatError::Disabled) }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  use super::*;

  fn chat(server: &MockServer) -> OpenAiChat {
    OpenAiChat::new(reqwest::Client::new(), AiConfig {
      base_url:      format!("{}/v1/", server.uri()),
      api_key:       "sk-test".into(),
      model:         default_model(),
      temperature:   default_temperature(),
      system_prompt: default_system_prompt(),
    })
  }

  #[tokio::test]
  async fn returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/v1/chat/completions"))
      .and(header("authorization", "Bearer sk-test"))
      .and(body_partial_json(json!({ "messages": [{ "role": "system" }, { "role": "user", "content": "How many leads?" }] })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": "Check the dashboard." } }]
      })))
      .expect(1)
      .mount(&server)
      .await;

    assert_eq!(chat(&server).reply("How many leads?").await.unwrap(), "Check the dashboard.");
  }

  #[tokio::test]
  async fn empty_choices_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
      .mount(&server)
      .await;

    assert!(matches!(chat(&server).reply("hi").await, Err(ChatError::EmptyReply)));
  }

  #[tokio::test]
  async fn upstream_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    assert!(matches!(chat(&server).reply("hi").await, Err(ChatError::Http(_))));
  }
}
