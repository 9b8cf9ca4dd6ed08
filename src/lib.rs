//! Standard Insights - Natural-Language Business Analytics
//!
//! This crate answers natural-language business questions by generating
//! read-only SQL against a fixed, allow-listed set of relational tables,
//! executing it under a hard row cap, and narrating the result.
//!
//! ## Request flow
//! Question -> Schema Fetch -> TF-IDF Retrieval -> Time Context ->
//! SQL Generation (LLM) -> Safety Guard -> Bounded Execution ->
//! Response Composition (LLM)
//!
//! The generated query can never mutate data, reference a table outside the
//! configured allow-list, carry comments, or chain multiple statements: every
//! candidate passes through [`guard::SqlSafetyGuard`] before execution.

// Core error handling
pub mod error;

// Process-wide, read-only configuration
pub mod config;

// Calendar ranges for the generation prompt
pub mod time_context;

// Schema catalog snippets and retrieval
pub mod retriever;
pub mod schema;

// SQL generation, validation and execution
pub mod executor;
pub mod generator;
pub mod guard;
pub mod llm;

// Response narration
pub mod composer;

// Request orchestration
pub mod pipeline;

pub use config::Settings;
pub use error::{ExecutionError, PipelineError};
pub use executor::{ExecutionOutcome, SqlExecutor};
pub use generator::GeneratedQuery;
pub use guard::{SqlSafetyGuard, Verdict};
pub use llm::LlmClient;
pub use pipeline::{PipelineResult, QueryPipeline};
pub use schema::{SchemaSnippet, SchemaSource};
