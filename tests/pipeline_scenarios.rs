//! End-to-End Pipeline Scenario Tests
//!
//! Drives the full ask() pipeline with canned schema, generator and executor
//! collaborators, verifying every terminal branch: accepted query with
//! scalar result, safety blocks (banned keyword, unlisted table),
//! clarification/out-of-domain sentinels, schema connectivity failure,
//! execution failure and composition failure.
//!
//! Run with: cargo test --test pipeline_scenarios

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use standard_insights::error::ExecutionError;
use standard_insights::executor::{ExecutionOutcome, SqlExecutor};
use standard_insights::llm::LlmClient;
use standard_insights::pipeline::{PipelineResult, QueryPipeline};
use standard_insights::schema::{SchemaSnippet, SchemaSource};
use standard_insights::{PipelineError, Settings};

/// Schema source returning a fixed snippet set, or failing on demand.
struct StubSchemaSource {
    fail: bool,
}

#[async_trait]
impl SchemaSource for StubSchemaSource {
    async fn fetch(&self) -> Result<Vec<SchemaSnippet>> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        Ok(vec![
            SchemaSnippet {
                table_name: "data_so_summary".to_string(),
                content: "Table: data_so_summary\nColumns:\n  - dsosu_id (int, not null) [primary key]\n  - so_date (date, nullable) order date\n  - total_cost (decimal, nullable) sales total"
                    .to_string(),
            },
            SchemaSnippet {
                table_name: "data_company_info".to_string(),
                content: "Table: data_company_info\nColumns:\n  - dci_id (int, not null) [primary key]\n  - company_name (varchar, nullable) customer name"
                    .to_string(),
            },
        ])
    }
}

/// Gateway stub: first chat call returns the canned generation output, any
/// later call (composition) returns the canned prose or fails.
struct StubLlm {
    generation_output: String,
    composition_output: Result<&'static str, ()>,
    calls: std::sync::Mutex<usize>,
}

impl StubLlm {
    fn new(generation_output: &str) -> Self {
        Self {
            generation_output: generation_output.to_string(),
            composition_output: Ok("Total sales yesterday were \u{20b9}42,500."),
            calls: std::sync::Mutex::new(0),
        }
    }

    fn with_failing_composer(generation_output: &str) -> Self {
        Self {
            generation_output: generation_output.to_string(),
            composition_output: Err(()),
            calls: std::sync::Mutex::new(0),
        }
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn chat(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            return Ok(self.generation_output.clone());
        }
        match self.composition_output {
            Ok(prose) => Ok(prose.to_string()),
            Err(()) => Err(anyhow!("gateway unreachable")),
        }
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }

    fn provider_name(&self) -> &str {
        "Stub"
    }
}

/// Executor stub returning a canned outcome or error.
struct StubExecutor {
    outcome: Result<ExecutionOutcome, ExecutionError>,
}

#[async_trait]
impl SqlExecutor for StubExecutor {
    async fn execute(&self, _sql: &str, _row_limit: usize) -> Result<ExecutionOutcome, ExecutionError> {
        self.outcome.clone()
    }
}

fn pipeline(
    schema_fail: bool,
    llm: StubLlm,
    outcome: Result<ExecutionOutcome, ExecutionError>,
) -> QueryPipeline {
    QueryPipeline::new(
        Settings::default(),
        Arc::new(StubSchemaSource { fail: schema_fail }),
        Arc::new(llm),
        Arc::new(StubExecutor { outcome }),
    )
}

async fn ask(pipeline: &QueryPipeline, question: &str) -> PipelineResult {
    pipeline.ask(question).await.expect("pipeline should not fail")
}

#[tokio::test]
async fn scenario_accepted_query_returns_scalar_result() {
    let sql = "SELECT SUM(total_cost) FROM data_so_summary WHERE so_date = '2024-06-18'";
    let pipeline = pipeline(false, StubLlm::new(sql), Ok(ExecutionOutcome::Scalar(json!(42500.0))));

    let result = ask(&pipeline, "show total sales yesterday").await;

    assert_eq!(result.sql.as_deref(), Some(sql));
    assert_eq!(result.result, Some(ExecutionOutcome::Scalar(json!(42500.0))));
    assert!(result.natural_response.contains("42,500"));
}

#[tokio::test]
async fn scenario_code_fenced_query_is_cleaned_before_validation() {
    let fenced = "```sql\nSELECT COUNT(*) FROM data_company_info\n```";
    let pipeline = pipeline(false, StubLlm::new(fenced), Ok(ExecutionOutcome::Scalar(json!(12))));

    let result = ask(&pipeline, "how many customers do we have").await;

    assert_eq!(result.sql.as_deref(), Some("SELECT COUNT(*) FROM data_company_info"));
    assert!(result.result.is_some());
}

#[tokio::test]
async fn scenario_banned_keyword_is_safety_blocked() {
    let pipeline = pipeline(
        false,
        StubLlm::new("DELETE FROM data_so_summary"),
        Ok(ExecutionOutcome::Rows(Vec::new())),
    );

    let result = ask(&pipeline, "remove all sales").await;

    assert!(result.sql.is_none());
    assert!(result.result.is_none());
    assert!(result.natural_response.contains("Safety Block"));
    assert!(result.natural_response.contains("Banned keyword found: DELETE"));
    assert!(result.natural_response.contains("DELETE FROM data_so_summary"));
}

#[tokio::test]
async fn scenario_unlisted_table_is_safety_blocked() {
    let pipeline = pipeline(
        false,
        StubLlm::new("SELECT * FROM secret_table"),
        Ok(ExecutionOutcome::Rows(Vec::new())),
    );

    let result = ask(&pipeline, "show me the secret table").await;

    assert!(result.sql.is_none());
    assert!(result.result.is_none());
    assert!(result
        .natural_response
        .contains("Table 'secret_table' is not in the allowed list."));
}

#[tokio::test]
async fn scenario_clarification_sentinel_short_circuits() {
    let pipeline = pipeline(
        false,
        StubLlm::new("__NEED_CLARIFICATION__"),
        Ok(ExecutionOutcome::Rows(Vec::new())),
    );

    let result = ask(&pipeline, "what about the thing").await;

    assert!(result.sql.is_none());
    assert!(result.result.is_none());
    assert!(result.natural_response.contains("I need more clarification"));
}

#[tokio::test]
async fn scenario_out_of_domain_sentinel_short_circuits() {
    let pipeline = pipeline(
        false,
        StubLlm::new("__NOT_DB__"),
        Ok(ExecutionOutcome::Rows(Vec::new())),
    );

    let result = ask(&pipeline, "what's the weather like").await;

    assert!(result.sql.is_none());
    assert!(result.result.is_none());
    assert!(result
        .natural_response
        .contains("not seem to be related to the available business data"));
}

#[tokio::test]
async fn scenario_schema_failure_is_a_terminal_message() {
    let pipeline = pipeline(
        true,
        StubLlm::new("SELECT 1"),
        Ok(ExecutionOutcome::Rows(Vec::new())),
    );

    let result = ask(&pipeline, "show total sales yesterday").await;

    assert!(result.sql.is_none());
    assert!(result.result.is_none());
    assert!(result.natural_response.contains("Database connection error"));
    assert!(result.natural_response.contains("connection refused"));
}

#[tokio::test]
async fn scenario_execution_failure_keeps_the_sql() {
    let sql = "SELECT missing_column FROM data_so_summary";
    let pipeline = pipeline(
        false,
        StubLlm::new(sql),
        Err(ExecutionError::Database(
            "Unknown column 'missing_column' in 'field list'".to_string(),
        )),
    );

    let result = ask(&pipeline, "show the missing column").await;

    assert_eq!(result.sql.as_deref(), Some(sql));
    assert!(result.result.is_none());
    assert!(result.natural_response.contains("Execution Error"));
    assert!(result.natural_response.contains("Unknown column"));
}

#[tokio::test]
async fn scenario_timeout_reads_like_an_engine_error() {
    let pipeline = pipeline(
        false,
        StubLlm::new("SELECT COUNT(*) FROM data_so_summary"),
        Err(ExecutionError::Timeout(30)),
    );

    let result = ask(&pipeline, "count sales").await;

    assert!(result
        .natural_response
        .contains("Execution Error: query timed out after 30 seconds"));
}

#[tokio::test]
async fn scenario_composer_failure_is_pipeline_fatal() {
    let pipeline = pipeline(
        false,
        StubLlm::with_failing_composer("SELECT COUNT(*) FROM data_so_summary"),
        Ok(ExecutionOutcome::Scalar(json!(3))),
    );

    let error = pipeline
        .ask("count sales")
        .await
        .expect_err("composer failure must fail the request");

    assert!(matches!(error, PipelineError::Composition(_)));
}

#[tokio::test]
async fn scenario_invalid_input_never_reaches_the_gateway() {
    let pipeline = pipeline(
        false,
        StubLlm::new("SELECT 1 FROM data_so_summary"),
        Ok(ExecutionOutcome::Rows(Vec::new())),
    );

    let result = ask(&pipeline, "1 UNION SELECT password FROM users").await;

    assert!(result.sql.is_none());
    assert!(result.natural_response.contains("Invalid query input"));
}
