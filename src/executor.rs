//! Query Executor
//!
//! Runs a Safety-Guard-accepted statement against the database and
//! normalises the result shape. The executor materialises at most
//! `row_limit` rows per call regardless of any LIMIT clause the statement
//! carries, and enforces a real wall-clock deadline on the fetch. It never
//! retries; the orchestrator decides what an execution failure means.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutionError;

/// Normalised execution result: a bare scalar when the result set is exactly
/// one row and one column, otherwise the (possibly empty) row sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    // Rows first: untagged deserialisation tries variants in order, and a
    // row list must not be absorbed by the scalar arm.
    Rows(Vec<Map<String, Value>>),
    Scalar(Value),
}

impl ExecutionOutcome {
    /// True when the outcome carries no data at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(value) => value.is_null(),
            Self::Rows(rows) => rows.is_empty(),
        }
    }
}

/// Apply the scalar-collapsing rule to fetched rows.
pub fn collapse(rows: Vec<Map<String, Value>>) -> ExecutionOutcome {
    if rows.len() == 1 && rows[0].len() == 1 {
        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value)
            .unwrap_or(Value::Null);
        return ExecutionOutcome::Scalar(value);
    }
    ExecutionOutcome::Rows(rows)
}

/// Execution seam. The production implementation talks to MySQL; tests
/// substitute canned outcomes.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute validated SQL, fetching at most `row_limit` rows.
    async fn execute(&self, sql: &str, row_limit: usize)
        -> Result<ExecutionOutcome, ExecutionError>;
}

#[cfg(feature = "database")]
pub use self::mysql::MySqlExecutor;

#[cfg(feature = "database")]
mod mysql {
    use super::{collapse, ExecutionOutcome, SqlExecutor};
    use crate::error::ExecutionError;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use futures::TryStreamExt;
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde_json::{Map, Number, Value};
    use sqlx::mysql::MySqlRow;
    use sqlx::{Column, MySqlPool, Row, TypeInfo};
    use std::time::Duration;
    use tracing::info;

    /// Executor backed by a shared MySQL pool. Each call is one short scoped
    /// acquisition: execute, fetch bounded, release. No held transaction.
    pub struct MySqlExecutor {
        pool: MySqlPool,
        timeout_secs: u64,
    }

    impl MySqlExecutor {
        pub fn new(pool: MySqlPool, timeout_secs: u64) -> Self {
            Self { pool, timeout_secs }
        }
    }

    #[async_trait]
    impl SqlExecutor for MySqlExecutor {
        async fn execute(
            &self,
            sql: &str,
            row_limit: usize,
        ) -> Result<ExecutionOutcome, ExecutionError> {
            let fetch = async {
                let mut stream = sqlx::query(sql).fetch(&self.pool);
                let mut rows: Vec<Map<String, Value>> = Vec::new();
                while let Some(row) = stream.try_next().await? {
                    rows.push(row_to_map(&row)?);
                    if rows.len() >= row_limit {
                        break;
                    }
                }
                Ok::<_, sqlx::Error>(rows)
            };

            let rows = tokio::time::timeout(Duration::from_secs(self.timeout_secs), fetch)
                .await
                .map_err(|_| ExecutionError::Timeout(self.timeout_secs))?
                .map_err(|e| ExecutionError::Database(e.to_string()))?;

            info!(row_count = rows.len(), "Query executed");
            Ok(collapse(rows))
        }
    }

    fn row_to_map(row: &MySqlRow) -> Result<Map<String, Value>, sqlx::Error> {
        let mut map = Map::new();
        for (index, column) in row.columns().iter().enumerate() {
            map.insert(column.name().to_string(), decode_column(row, index)?);
        }
        Ok(map)
    }

    /// Decode one MySQL column into JSON by declared type, NULLs preserved.
    fn decode_column(row: &MySqlRow, index: usize) -> Result<Value, sqlx::Error> {
        let type_name = row.column(index).type_info().name().to_uppercase();

        let value = match type_name.as_str() {
            "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            "FLOAT" => row
                .try_get::<Option<f32>, _>(index)?
                .and_then(|v| Number::from_f64(f64::from(v)))
                .map(Value::Number),
            "DOUBLE" => row
                .try_get::<Option<f64>, _>(index)?
                .and_then(Number::from_f64)
                .map(Value::Number),
            "DECIMAL" => row.try_get::<Option<Decimal>, _>(index)?.map(decimal_to_value),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(index)?
                .map(|d| Value::String(d.to_string())),
            "DATETIME" => row
                .try_get::<Option<NaiveDateTime>, _>(index)?
                .map(|d| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string())),
            "TIMESTAMP" => row
                .try_get::<Option<DateTime<Utc>>, _>(index)?
                .map(|d| Value::String(d.to_rfc3339())),
            "TIME" => row
                .try_get::<Option<NaiveTime>, _>(index)?
                .map(|t| Value::String(t.to_string())),
            "YEAR" => row
                .try_get::<Option<u16>, _>(index)?
                .map(|v| Value::Number(u64::from(v).into())),
            "JSON" => row.try_get::<Option<Value>, _>(index)?,
            name if name.contains("UNSIGNED") => row
                .try_get::<Option<u64>, _>(index)?
                .map(|v| Value::Number(v.into())),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get::<Option<i64>, _>(index)?
                .map(|v| Value::Number(v.into())),
            name if name.contains("BLOB") || name.contains("BINARY") => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            _ => row.try_get::<Option<String>, _>(index)?.map(Value::String),
        };

        Ok(value.unwrap_or(Value::Null))
    }

    fn decimal_to_value(decimal: Decimal) -> Value {
        match decimal.to_f64().and_then(Number::from_f64) {
            Some(number) => Value::Number(number),
            None => Value::String(decimal.to_string()),
        }
    }
}
