//! SQL Safety Guard
//!
//! Decides, before any execution, whether generated text is a safe, single,
//! read-only SELECT confined to the allow-listed tables. Cheap lexical
//! checks run first; the dialect-aware parse runs last, and the allow-list
//! check is structural (by parsed table reference) so it cannot be defeated
//! by whitespace, casing or qualifier tricks. Every rejection is reported as
//! a verdict, never raised as an error.

use std::ops::ControlFlow;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{visit_relations, SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::generator::{NEED_CLARIFICATION_SENTINEL, NOT_DB_SENTINEL};

/// Statement keywords that are never allowed, matched as whole words so a
/// column named `created_at` does not trip CREATE.
const BANNED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "GRANT",
    "REVOKE",
];

/// Risky functions and clauses, matched as case-insensitive substrings.
const RISKY_FUNCTIONS: &[&str] = &["SLEEP", "BENCHMARK", "LOAD_FILE", "INTO OUTFILE", "INTO DUMPFILE"];

static BANNED_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    BANNED_KEYWORDS
        .iter()
        .map(|keyword| {
            (
                *keyword,
                Regex::new(&format!(r"(?i)\b{keyword}\b")).expect("static keyword pattern"),
            )
        })
        .collect()
});

/// Outcome of validation: fully accepted or fully rejected with one
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    pub reason: String,
}

impl Verdict {
    fn safe() -> Self {
        Self {
            ok: true,
            reason: "SQL is safe.".to_string(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// Allow-list policy validator for generated SQL text.
pub struct SqlSafetyGuard {
    allowed_tables: Vec<String>,
}

impl SqlSafetyGuard {
    /// Build a guard over the configured physical-table allow-list.
    pub fn new(allowed_tables: Vec<String>) -> Self {
        Self {
            allowed_tables: allowed_tables
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Validate one piece of generated text. Never mutates its input and
    /// never executes it; the same text always yields the same verdict.
    pub fn validate(&self, sql: &str) -> Verdict {
        if sql.trim().is_empty()
            || sql == NEED_CLARIFICATION_SENTINEL
            || sql == NOT_DB_SENTINEL
        {
            return Verdict::reject("Not a valid SQL query.");
        }

        for (keyword, pattern) in BANNED_PATTERNS.iter() {
            if pattern.is_match(sql) {
                return Verdict::reject(format!("Banned keyword found: {keyword}"));
            }
        }

        let upper = sql.to_uppercase();
        for function in RISKY_FUNCTIONS {
            if upper.contains(function) {
                return Verdict::reject(format!("Risky function found: {function}"));
            }
        }

        if sql.contains(';') {
            let statements = sql.split(';').filter(|part| !part.trim().is_empty()).count();
            if statements > 1 {
                return Verdict::reject("Multiple SQL statements are not allowed.");
            }
        }

        // Comments are an obfuscation vector; disallowed unconditionally.
        if sql.contains("--") || sql.contains("/*") {
            return Verdict::reject("SQL comments are not allowed.");
        }

        let statements = match Parser::parse_sql(&MySqlDialect {}, sql) {
            Ok(statements) => statements,
            Err(error) => return Verdict::reject(format!("SQL parsing error: {error}")),
        };
        if statements.len() > 1 {
            return Verdict::reject("Multiple SQL statements are not allowed.");
        }
        let statement = match statements.first() {
            Some(statement) => statement,
            None => return Verdict::reject("Not a valid SQL query."),
        };

        match statement {
            Statement::Query(query) => {
                if !matches!(query.body.as_ref(), SetExpr::Select(_)) {
                    return Verdict::reject("Only SELECT queries are allowed.");
                }
            }
            _ => return Verdict::reject("Only SELECT queries are allowed."),
        }

        // Structural allow-list check over every table reference, joined and
        // subqueried tables included.
        let mut referenced: Vec<String> = Vec::new();
        let _ = visit_relations(statement, |relation| {
            if let Some(name) = relation.0.last() {
                referenced.push(name.value.to_lowercase());
            }
            ControlFlow::<()>::Continue(())
        });

        for table in &referenced {
            if !self.allowed_tables.contains(table) {
                return Verdict::reject(format!("Table '{table}' is not in the allowed list."));
            }
        }

        Verdict::safe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SqlSafetyGuard {
        SqlSafetyGuard::new(vec![
            "data_so_summary".to_string(),
            "data_company_info".to_string(),
            "data_so_details".to_string(),
        ])
    }

    #[test]
    fn accepts_simple_select() {
        let verdict = guard().validate("SELECT * FROM data_so_summary");
        assert!(verdict.ok, "unexpected rejection: {}", verdict.reason);
        assert_eq!(verdict.reason, "SQL is safe.");
    }

    #[test]
    fn accepts_join_on_allowed_tables() {
        let sql = "SELECT c.company_name, SUM(s.total_cost) \
                   FROM data_so_summary s \
                   JOIN data_company_info c ON s.client_id = c.dci_id \
                   GROUP BY c.company_name";
        assert!(guard().validate(sql).ok);
    }

    #[test]
    fn rejects_banned_keywords_any_case() {
        for sql in ["DELETE FROM data_so_summary", "delete from data_so_summary"] {
            let verdict = guard().validate(sql);
            assert!(!verdict.ok);
            assert_eq!(verdict.reason, "Banned keyword found: DELETE");
        }

        let verdict = guard().validate("DROP TABLE data_so_summary");
        assert_eq!(verdict.reason, "Banned keyword found: DROP");
    }

    #[test]
    fn keyword_inside_identifier_does_not_trip() {
        // `created_at` contains CREATE as a substring but not as a word.
        let sql = "SELECT created_at FROM data_so_summary WHERE created_at > '2024-01-01'";
        let verdict = guard().validate(sql);
        assert!(verdict.ok, "unexpected rejection: {}", verdict.reason);
    }

    #[test]
    fn rejects_risky_functions() {
        let verdict = guard().validate("SELECT SLEEP(10)");
        assert_eq!(verdict.reason, "Risky function found: SLEEP");

        let verdict = guard().validate("SELECT * FROM data_so_summary INTO OUTFILE '/tmp/x'");
        assert_eq!(verdict.reason, "Risky function found: INTO OUTFILE");
    }

    #[test]
    fn rejects_multiple_statements() {
        let verdict = guard().validate("SELECT 1 FROM data_so_summary; SELECT 2 FROM data_so_summary");
        assert_eq!(verdict.reason, "Multiple SQL statements are not allowed.");
    }

    #[test]
    fn trailing_semicolon_is_not_multiple_statements() {
        let verdict = guard().validate("SELECT so_date FROM data_so_summary;");
        assert!(verdict.ok, "unexpected rejection: {}", verdict.reason);
    }

    #[test]
    fn rejects_comments() {
        let verdict = guard().validate("SELECT so_date FROM data_so_summary -- hidden");
        assert_eq!(verdict.reason, "SQL comments are not allowed.");

        let verdict = guard().validate("SELECT /* hidden */ so_date FROM data_so_summary");
        assert_eq!(verdict.reason, "SQL comments are not allowed.");
    }

    #[test]
    fn rejects_empty_and_sentinels() {
        for sql in ["", "   ", NEED_CLARIFICATION_SENTINEL, NOT_DB_SENTINEL] {
            let verdict = guard().validate(sql);
            assert_eq!(verdict.reason, "Not a valid SQL query.");
        }
    }

    #[test]
    fn rejects_unparseable_text() {
        let verdict = guard().validate("SELECT FROM FROM WHERE");
        assert!(!verdict.ok);
        assert!(verdict.reason.starts_with("SQL parsing error:"));
    }

    #[test]
    fn rejects_table_outside_allow_list() {
        let verdict = guard().validate("SELECT * FROM secret_table");
        assert_eq!(
            verdict.reason,
            "Table 'secret_table' is not in the allowed list."
        );
    }

    #[test]
    fn rejects_unlisted_table_inside_join() {
        let sql = "SELECT * FROM data_so_summary s JOIN mysql.user u ON s.client_id = u.id";
        let verdict = guard().validate(sql);
        assert_eq!(verdict.reason, "Table 'user' is not in the allowed list.");
    }

    #[test]
    fn rejects_unlisted_table_inside_subquery() {
        let sql = "SELECT * FROM data_so_summary \
                   WHERE client_id IN (SELECT id FROM secret_table)";
        let verdict = guard().validate(sql);
        assert_eq!(
            verdict.reason,
            "Table 'secret_table' is not in the allowed list."
        );
    }

    #[test]
    fn allow_list_comparison_is_case_insensitive() {
        let verdict = guard().validate("SELECT * FROM DATA_SO_SUMMARY");
        assert!(verdict.ok, "unexpected rejection: {}", verdict.reason);
    }

    #[test]
    fn validation_is_idempotent() {
        let guard = guard();
        let sql = "SELECT * FROM secret_table";
        let first = guard.validate(sql);
        let second = guard.validate(sql);
        assert_eq!(first, second);
    }
}
