//! Response Composer
//!
//! Narrates a successful execution as business prose. The composer is only
//! invoked with a real result; a failure here is request-fatal because a
//! result without narration is not acceptable output.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::executor::ExecutionOutcome;
use crate::llm::LlmClient;

const COMPOSER_SYSTEM_PROMPT: &str =
    "You are a helpful business data assistant. Summarize results accurately.";

/// Narration service over an LLM gateway.
pub struct ResponseComposer {
    client: Arc<dyn LlmClient>,
}

impl ResponseComposer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Produce the final natural-language answer from (question, sql, result).
    pub async fn compose(
        &self,
        question: &str,
        sql: &str,
        outcome: &ExecutionOutcome,
    ) -> Result<String> {
        let result_json =
            serde_json::to_string(outcome).context("Failed to serialise execution outcome")?;

        let prompt = format!(
            "USER QUESTION: {question}\n\
             SQL EXECUTED: {sql}\n\
             DATABASE RESULT: {result_json}\n\n\
             Generate a clear, human-readable business response based ONLY on the database result above.\n\
             Instructions:\n\
             1. Do not invent or hallucinate numbers.\n\
             2. Use \u{20b9} prefix for currency and format numbers with commas where appropriate.\n\
             3. If the result is null or empty, state that no records were found."
        );

        let response = self.client.chat(COMPOSER_SYSTEM_PROMPT, &prompt, 0.3).await?;
        info!(
            provider = self.client.provider_name(),
            "Natural response generated"
        );
        Ok(response)
    }
}
