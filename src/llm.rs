//! Text completion over an OpenAI-compatible chat API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default OpenAI-compatible endpoint (Groq)
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";

/// Default tutor instructions
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Linguo, an encouraging and knowledgeable language teacher. \
Provide short and clear responses, focusing on language learning and practice. \
If a request is unclear, ask for clarification related to the language topic. \
You do not have access to real-time information, so focus on language instruction rather than current events or data. \
Your responses are read aloud by text-to-speech software, so avoid complex formatting, markdown, or emojis. \
Offer simple explanations or practice exercises, and answer in 2 or 3 sentences.";

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Produces the tutor's reply
#[async_trait]
pub trait Completer: Send + Sync {
    /// Reply to `message` given the prior `history`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or no reply is returned
    async fn complete(&self, history: &[ChatMessage], message: &str) -> Result<String>;
}

/// Chat completions client
pub struct ChatClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        api_key: SecretString,
        base_url: String,
        model: String,
        system_prompt: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Groq API key required for chat".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            system_prompt,
        })
    }

    fn request<'a>(&'a self, history: &'a [ChatMessage], message: &'a str) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(MessageRef {
            role: Role::System,
            content: &self.system_prompt,
        });
        messages.extend(history.iter().map(|m| MessageRef {
            role: m.role,
            content: &m.content,
        }));
        messages.push(MessageRef {
            role: Role::User,
            content: message,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
        }
    }
}

#[async_trait]
impl Completer for ChatClient {
    async fn complete(&self, history: &[ChatMessage], message: &str) -> Result<String> {
        let request = self.request(history, message);
        tracing::debug!(model = %self.model, messages = request.messages.len(), "requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("chat API error {status}: {body}")));
        }

        let result: ChatCompletionResponse = response.json().await?;
        first_reply(result)
    }
}

fn first_reply(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Llm("completion returned no content".to_string()))
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<MessageRef<'a>>,
}

#[derive(Serialize)]
struct MessageRef<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
