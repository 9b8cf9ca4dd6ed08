//! Schema catalog snippets
//!
//! One text snippet per allow-listed table, rendered from live catalog
//! metadata in physical column order. Snippets are rebuilt on every request
//! so the generator always sees the current schema; nothing here is cached.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Human/LLM-readable rendering of one table's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnippet {
    pub table_name: String,
    pub content: String,
}

/// Key role of a column, as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Primary,
    Foreign,
    None,
}

/// Column metadata in catalog ordinal order.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub comment: String,
    pub key_role: KeyRole,
}

/// Deterministic snippet rendering: every column's name, type, nullability,
/// comment and key role, in the order the catalog reports them.
pub fn render_snippet(table_name: &str, columns: &[ColumnInfo]) -> SchemaSnippet {
    let mut content = format!("Table: {table_name}\nColumns:");
    for column in columns {
        let nullability = if column.nullable { "nullable" } else { "not null" };
        content.push_str(&format!(
            "\n  - {} ({}, {})",
            column.name, column.data_type, nullability
        ));
        if !column.comment.is_empty() {
            content.push(' ');
            content.push_str(&column.comment);
        }
        match column.key_role {
            KeyRole::Primary => content.push_str(" [primary key]"),
            KeyRole::Foreign => content.push_str(" [foreign key]"),
            KeyRole::None => {}
        }
    }

    SchemaSnippet {
        table_name: table_name.to_string(),
        content,
    }
}

/// Catalog access seam. The production implementation reads the database
/// catalog; tests substitute a canned snippet set.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Fetch one snippet per allow-listed table that exists in the catalog.
    async fn fetch(&self) -> Result<Vec<SchemaSnippet>>;
}

#[cfg(feature = "database")]
pub use self::mysql::MySqlSchemaSource;

#[cfg(feature = "database")]
mod mysql {
    use super::{render_snippet, ColumnInfo, KeyRole, SchemaSnippet, SchemaSource};
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use sqlx::{MySqlPool, Row};
    use std::collections::HashSet;
    use tracing::info;

    /// Snippet source backed by `INFORMATION_SCHEMA` on the target MySQL
    /// database.
    pub struct MySqlSchemaSource {
        pool: MySqlPool,
        db_name: String,
        allowed_tables: Vec<String>,
    }

    impl MySqlSchemaSource {
        pub fn new(pool: MySqlPool, db_name: String, allowed_tables: Vec<String>) -> Self {
            Self {
                pool,
                db_name,
                allowed_tables,
            }
        }

        fn table_placeholders(&self) -> String {
            vec!["?"; self.allowed_tables.len()].join(", ")
        }

        /// Columns that participate in a foreign-key constraint, keyed by
        /// (table, column).
        async fn foreign_key_columns(&self) -> Result<HashSet<(String, String)>> {
            let sql = format!(
                "SELECT TABLE_NAME, COLUMN_NAME \
                 FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = ? \
                   AND REFERENCED_TABLE_NAME IS NOT NULL \
                   AND TABLE_NAME IN ({})",
                self.table_placeholders()
            );

            let mut query = sqlx::query(&sql).bind(&self.db_name);
            for table in &self.allowed_tables {
                query = query.bind(table);
            }

            let rows = query
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch foreign key metadata")?;

            let mut keys = HashSet::new();
            for row in rows {
                let table: String = row.try_get("TABLE_NAME")?;
                let column: String = row.try_get("COLUMN_NAME")?;
                keys.insert((table, column));
            }
            Ok(keys)
        }
    }

    #[async_trait]
    impl SchemaSource for MySqlSchemaSource {
        async fn fetch(&self) -> Result<Vec<SchemaSnippet>> {
            if self.allowed_tables.is_empty() {
                return Ok(Vec::new());
            }

            let foreign_keys = self.foreign_key_columns().await?;

            let sql = format!(
                "SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE, IS_NULLABLE, \
                        COLUMN_COMMENT, COLUMN_KEY \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME IN ({}) \
                 ORDER BY TABLE_NAME, ORDINAL_POSITION",
                self.table_placeholders()
            );

            let mut query = sqlx::query(&sql).bind(&self.db_name);
            for table in &self.allowed_tables {
                query = query.bind(table);
            }

            let rows = query
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch schema from INFORMATION_SCHEMA")?;

            // Group rows per table, preserving catalog order.
            let mut tables: Vec<(String, Vec<ColumnInfo>)> = Vec::new();
            for row in rows {
                let table: String = row.try_get("TABLE_NAME")?;
                let name: String = row.try_get("COLUMN_NAME")?;
                let data_type: String = row.try_get("DATA_TYPE")?;
                let is_nullable: String = row.try_get("IS_NULLABLE")?;
                let comment: String = row.try_get::<Option<String>, _>("COLUMN_COMMENT")?.unwrap_or_default();
                let column_key: String = row.try_get::<Option<String>, _>("COLUMN_KEY")?.unwrap_or_default();

                let key_role = if column_key == "PRI" {
                    KeyRole::Primary
                } else if foreign_keys.contains(&(table.clone(), name.clone())) {
                    KeyRole::Foreign
                } else {
                    KeyRole::None
                };

                let column = ColumnInfo {
                    name,
                    data_type,
                    nullable: is_nullable.eq_ignore_ascii_case("YES"),
                    comment,
                    key_role,
                };

                match tables.last_mut() {
                    Some((current, columns)) if *current == table => columns.push(column),
                    _ => tables.push((table, vec![column])),
                }
            }

            let snippets: Vec<SchemaSnippet> = tables
                .iter()
                .map(|(table, columns)| render_snippet(table, columns))
                .collect();

            info!("Schema fetched for {} tables", snippets.len());
            Ok(snippets)
        }
    }
}
