//! LLM Client
//!
//! Unified gateway interface for text-generation collaborators, plus the
//! production Groq implementation (OpenAI-compatible chat completions API).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Default Groq model
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Groq chat-completions endpoint
const API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Text-generation gateway interface. The pipeline only ever sees this trait;
/// tests substitute canned responses.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Call the LLM with system + user prompts, return raw text response.
    async fn chat(&self, system_prompt: &str, user_prompt: &str, temperature: f32)
        -> Result<String>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}

/// Groq API client
#[derive(Clone)]
pub struct GroqClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl GroqClient {
    /// Create a new Groq client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            api_key,
            client: reqwest::Client::new(),
            model,
        }
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| anyhow!("GROQ_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    /// Internal API call implementation
    async fn call_api(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt}
                ],
                "temperature": temperature
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Groq API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow!("Groq returned no choices"))
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        self.call_api(system_prompt, user_prompt, temperature).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Groq"
    }
}
