//! Pipeline Orchestrator
//!
//! Sequences schema fetch, retrieval, time context, generation, validation,
//! execution and composition for one request, and converts every policy
//! outcome into a well-formed [`PipelineResult`]. Only an unreachable
//! generation gateway or a composition failure after a successful execution
//! surface as errors; everything else is a terminal result with a populated
//! `natural_response`.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::composer::ResponseComposer;
use crate::config::Settings;
use crate::error::PipelineError;
use crate::executor::{ExecutionOutcome, SqlExecutor};
use crate::generator::{GeneratedQuery, SqlGenerator};
use crate::guard::SqlSafetyGuard;
use crate::llm::LlmClient;
use crate::retriever::SchemaRetriever;
use crate::schema::SchemaSource;
use crate::time_context::TimeContext;

const CLARIFICATION_MESSAGE: &str =
    "I need more clarification to answer this question accurately.";
const NOT_DB_MESSAGE: &str =
    "This question does not seem to be related to the available business data.";
const INVALID_INPUT_MESSAGE: &str =
    "Invalid query input. Please provide a valid natural language question.";

/// Longest accepted question, in characters.
const MAX_QUESTION_LENGTH: usize = 1000;

/// Obvious injection shapes screened ahead of the safety guard.
static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)union\s+select",
        r"(?i)drop\s+table",
        r"(?i)exec\s*\(",
        r"(?i)sp_",
        r"(?i)xp_",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static injection pattern"))
    .collect()
});

/// Defense-in-depth screen on the inbound question, ahead of the pipeline.
pub fn screen_question(question: &str) -> bool {
    let trimmed = question.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_QUESTION_LENGTH {
        return false;
    }
    !INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(question))
}

/// The unit returned to the caller. Every terminal path populates all three
/// fields; `natural_response` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub sql: Option<String>,
    pub result: Option<ExecutionOutcome>,
    pub natural_response: String,
}

impl PipelineResult {
    fn refusal(natural_response: impl Into<String>) -> Self {
        Self {
            sql: None,
            result: None,
            natural_response: natural_response.into(),
        }
    }
}

/// Request pipeline over the external collaborator seams.
pub struct QueryPipeline {
    settings: Settings,
    schema_source: Arc<dyn SchemaSource>,
    generator: SqlGenerator,
    guard: SqlSafetyGuard,
    executor: Arc<dyn SqlExecutor>,
    composer: ResponseComposer,
}

impl QueryPipeline {
    /// Wire the pipeline. The same gateway client serves generation and
    /// composition; the guard's allow-list comes from the settings' table
    /// mapping, the single source of truth.
    pub fn new(
        settings: Settings,
        schema_source: Arc<dyn SchemaSource>,
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        let generator = SqlGenerator::new(llm.clone(), &settings);
        let composer = ResponseComposer::new(llm);
        let guard = SqlSafetyGuard::new(settings.allowed_tables());

        Self {
            settings,
            schema_source,
            generator,
            guard,
            executor,
            composer,
        }
    }

    /// Answer one natural-language question.
    pub async fn ask(&self, question: &str) -> Result<PipelineResult, PipelineError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, question, "Processing question");

        if !screen_question(question) {
            warn!(%request_id, "Question rejected by inbound screening");
            return Ok(PipelineResult::refusal(INVALID_INPUT_MESSAGE));
        }

        // 1. Fetch current schema; stale metadata is worse than a refetch.
        let snippets = match self.schema_source.fetch().await {
            Ok(snippets) => snippets,
            Err(error) => {
                warn!(%request_id, %error, "Schema fetch failed");
                return Ok(PipelineResult::refusal(format!(
                    "Database connection error: Unable to fetch schema information. \
                     Please check database connectivity. Error: {error}"
                )));
            }
        };

        // 2. Rank snippets against the question and keep the top-k.
        let retriever = SchemaRetriever::new(snippets);
        let schema_context = retriever.context_block(question, self.settings.retrieval_k);
        debug!(%request_id, context_len = schema_context.len(), "Schema context retrieved");

        // 3. Calendar ranges in the reporting zone.
        let time_context = TimeContext::now(self.settings.timezone).render();

        // 4. Generate SQL or a sentinel. Transport failures are fatal.
        let generated = self
            .generator
            .generate(question, &schema_context, &time_context)
            .await
            .map_err(PipelineError::Generation)?;

        let sql = match generated {
            GeneratedQuery::NeedsClarification => {
                info!(%request_id, "Generation asked for clarification");
                return Ok(PipelineResult::refusal(CLARIFICATION_MESSAGE));
            }
            GeneratedQuery::NotADatabaseQuestion => {
                info!(%request_id, "Question is outside the data domain");
                return Ok(PipelineResult::refusal(NOT_DB_MESSAGE));
            }
            GeneratedQuery::Sql(sql) => sql,
        };

        // 5. Safety guard. Rejections keep the offending text for audit.
        let verdict = self.guard.validate(&sql);
        if !verdict.ok {
            warn!(%request_id, reason = %verdict.reason, "Safety guard rejected query");
            return Ok(PipelineResult::refusal(format!(
                "Safety Block: {}. Query attempt: {}",
                verdict.reason, sql
            )));
        }

        // 6. Bounded execution. Engine errors become user-facing text.
        let outcome = match self.executor.execute(&sql, self.settings.row_limit).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%request_id, %error, "Query execution failed");
                return Ok(PipelineResult {
                    sql: Some(sql),
                    result: None,
                    natural_response: format!("Execution Error: {error}"),
                });
            }
        };

        // 7. Narrate. A result without narration is incomplete output.
        let natural_response = self
            .composer
            .compose(question, &sql, &outcome)
            .await
            .map_err(PipelineError::Composition)?;

        info!(%request_id, "Question answered");
        Ok(PipelineResult {
            sql: Some(sql),
            result: Some(outcome),
            natural_response,
        })
    }
}
