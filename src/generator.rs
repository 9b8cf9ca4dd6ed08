//! SQL Generation Gateway
//!
//! Turns (schema context, time context, question) into either SQL text or a
//! policy sentinel. The gateway's raw output is treated as a black box: code
//! fences are stripped, sentinels are recognised by exact equality, and the
//! result is handed back as a tagged value so the orchestrator branches
//! exhaustively instead of comparing strings.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Settings;
use crate::llm::LlmClient;

/// Reserved gateway output: the question is ambiguous or unanswerable from
/// the provided schema.
pub const NEED_CLARIFICATION_SENTINEL: &str = "__NEED_CLARIFICATION__";

/// Reserved gateway output: the question is out of the data domain.
pub const NOT_DB_SENTINEL: &str = "__NOT_DB__";

/// Classified gateway output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedQuery {
    Sql(String),
    NeedsClarification,
    NotADatabaseQuestion,
}

impl GeneratedQuery {
    /// Strip code fencing the model may have added despite instructions,
    /// then classify the remaining text.
    pub fn classify(raw: &str) -> Self {
        let cleaned = raw.replace("```sql", "").replace("```", "").trim().to_string();
        match cleaned.as_str() {
            NEED_CLARIFICATION_SENTINEL => Self::NeedsClarification,
            NOT_DB_SENTINEL => Self::NotADatabaseQuestion,
            _ => Self::Sql(cleaned),
        }
    }
}

/// Render the fixed policy prompt from the injected configuration, so the
/// prompt's table mappings and column hints can never drift from the
/// guard's allow-list.
pub fn policy_prompt(settings: &Settings) -> String {
    // Group logical names per physical table, preserving mapping order.
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (logical, physical) in &settings.table_mapping {
        match grouped.iter_mut().find(|(p, _)| p == physical) {
            Some((_, logicals)) => logicals.push(logical.clone()),
            None => grouped.push((physical.clone(), vec![logical.clone()])),
        }
    }
    let mapping_lines: Vec<String> = grouped
        .iter()
        .map(|(physical, logicals)| format!("   - {} -> {}", logicals.join("/"), physical))
        .collect();

    let patterns = &settings.column_patterns;
    format!(
        "You are a MySQL expert. Generate ONLY the raw SQL query for the user's question.\n\
         Rules:\n\
         1. Use ONLY the column names that appear EXACTLY as provided in the schema below. Do not assume or invent column names.\n\
         2. Output ONLY raw SQL. No markdown, no explanations, no triple backticks.\n\
         3. Only SELECT queries are allowed.\n\
         4. If the question is ambiguous or cannot be answered using the schema, output exactly: {NEED_CLARIFICATION_SENTINEL}\n\
         5. If the question is not related to the database, output exactly: {NOT_DB_SENTINEL}\n\
         6. TABLE MAPPINGS:\n{mappings}\n\
         7. COLUMN GUIDELINES:\n\
            - When looking for date columns, check the schema for columns like {date_columns}.\n\
            - When looking for amount/price columns, check for {amount_columns}.\n\
            - When looking for ID columns, check for {id_columns} - but only use what exists in the schema.\n\
            - If the schema doesn't contain the necessary columns to answer the question, return {NEED_CLARIFICATION_SENTINEL}.\n\
         8. JOIN GUIDELINES:\n\
            - Use ONLY the exact column names from the provided schema to build join conditions; columns marked [primary key] and [foreign key] indicate the join keys.\n\
            - DO NOT assume primary key column names. Look carefully at the column names in the schema to find proper join keys.\n\
            - If you cannot determine the proper join conditions from the schema, return {NEED_CLARIFICATION_SENTINEL}.\n\
         9. IMPORTANT: The schema information provided below contains ALL the available columns in the database. Use ONLY these column names and nothing else.",
        mappings = mapping_lines.join("\n"),
        date_columns = patterns.date_columns.join(", "),
        amount_columns = patterns.amount_columns.join(", "),
        id_columns = patterns.id_columns.join(", "),
    )
}

/// Generation service over an LLM gateway.
pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl SqlGenerator {
    pub fn new(client: Arc<dyn LlmClient>, settings: &Settings) -> Self {
        Self {
            system_prompt: policy_prompt(settings),
            client,
        }
    }

    /// Generate and classify a query for the question. Transport failures
    /// propagate; the caller decides how request-fatal they are.
    pub async fn generate(
        &self,
        question: &str,
        schema_context: &str,
        time_context: &str,
    ) -> Result<GeneratedQuery> {
        let user_prompt = format!(
            "SCHEMA CONTEXT:\n{schema_context}\n\nDATE CONTEXT:\n{time_context}\n\nUSER QUESTION: {question}"
        );

        let raw = self.client.chat(&self.system_prompt, &user_prompt, 0.0).await?;
        let generated = GeneratedQuery::classify(&raw);
        info!(
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            "SQL generation completed"
        );
        Ok(generated)
    }
}
