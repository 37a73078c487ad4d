//! SQL Safety Validator
//!
//! Gates every statement before execution: injection patterns, stacked
//! statements, destructive operations, table allow-list and an advisory
//! complexity score. Every rule runs so the caller sees all issues at once.
//! The check is textual and keeps no state between calls.

use crate::config::{EngineConfig, SafetySettings};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

lazy_static! {
    static ref INJECTION_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"--").unwrap(), "inline comment (--)"),
        (Regex::new(r"/\*").unwrap(), "block comment (/*)"),
        (Regex::new(r"(?i)\bxp_").unwrap(), "extended procedure (xp_)"),
        (Regex::new(r"(?i)\bsp_").unwrap(), "stored procedure (sp_)"),
        (Regex::new(r"(?i)\bexec(?:ute)?\s*\(").unwrap(), "dynamic execution (exec()"),
    ];

    static ref WHERE_CLAUSE: Regex = Regex::new(r"(?i)\bWHERE\b").unwrap();
    static ref JOIN: Regex = Regex::new(r"(?i)\bJOIN\b").unwrap();
    static ref SUBQUERY: Regex = Regex::new(r"(?i)\(\s*SELECT\b").unwrap();
    static ref AGGREGATE: Regex = Regex::new(r"(?i)\b(?:COUNT|SUM|AVG|MAX|MIN)\s*\(|\bGROUP\s+BY\b").unwrap();
    static ref UNION: Regex = Regex::new(r"(?i)\bUNION\b").unwrap();
    static ref LEADING_WILDCARD_LIKE: Regex = Regex::new(r"(?i)\bLIKE\s+'%").unwrap();

    static ref TABLE_REFERENCE: Regex =
        Regex::new(r#"(?i)\b(?:FROM|JOIN|INTO|UPDATE)\s+([`"\[]?[a-z_][a-z0-9_$]*[`"\]]?(?:\.[`"\[]?[a-z_][a-z0-9_$]*[`"\]]?)?)"#)
            .unwrap();
}

const DESTRUCTIVE_KEYWORDS: &[&str] = &["DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE"];

/// Outcome of validating one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub is_destructive: bool,
    pub complexity_score: u32,
    /// Leading keyword, or "DELETE/UPDATE without WHERE clause"
    pub operation: String,
    /// Destructive and neither confirmed nor globally allowed
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone)]
pub struct SqlValidator {
    allow_destructive: bool,
    max_complexity: u32,
    /// Lowercase allow-list; empty means unrestricted
    allowed_tables: HashSet<String>,
}

impl SqlValidator {
    pub fn new(allow_destructive: bool, max_complexity: u32) -> Self {
        Self {
            allow_destructive,
            max_complexity,
            allowed_tables: HashSet::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::from_settings(&SafetySettings::from(config))
    }

    pub fn from_settings(settings: &SafetySettings) -> Self {
        Self::new(settings.allow_destructive_queries, settings.max_query_complexity)
            .with_allowed_tables(settings.allowed_tables.iter().map(String::as_str))
    }

    pub fn with_allowed_tables<'a>(mut self, tables: impl IntoIterator<Item = &'a str>) -> Self {
        self.allowed_tables = tables
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn validate(&self, sql: &str, confirm_destructive: bool) -> ValidationVerdict {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return ValidationVerdict {
                accepted: false,
                errors: vec!["Empty query".to_string()],
                warnings: Vec::new(),
                is_destructive: false,
                complexity_score: 0,
                operation: String::new(),
                requires_confirmation: false,
            };
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (pattern, description) in INJECTION_PATTERNS.iter() {
            if pattern.is_match(trimmed) {
                errors.push(format!("Potentially dangerous pattern detected: {}", description));
            }
        }

        if statement_count(trimmed) > 1 {
            errors.push("Multiple SQL statements not allowed".to_string());
        }

        let (operation, is_destructive) = classify(trimmed);
        let requires_confirmation = is_destructive && !confirm_destructive && !self.allow_destructive;
        if requires_confirmation {
            errors.push(format!(
                "Destructive operation ({}) requires confirmation; resubmit with confirm_destructive=true",
                operation
            ));
        } else if is_destructive {
            warnings.push(format!("Destructive operation: {}", operation));
        }

        if !self.allowed_tables.is_empty() {
            let unauthorized = self.unauthorized_tables(trimmed);
            if !unauthorized.is_empty() {
                errors.push(format!("Unauthorized tables: {}", unauthorized.join(", ")));
            }
        }

        let complexity_score = complexity_score(trimmed);
        if complexity_score > self.max_complexity {
            warnings.push(format!(
                "Query complexity score {} exceeds threshold {}",
                complexity_score, self.max_complexity
            ));
        }

        ValidationVerdict {
            accepted: errors.is_empty(),
            errors,
            warnings,
            is_destructive,
            complexity_score,
            operation,
            requires_confirmation,
        }
    }

    fn unauthorized_tables(&self, sql: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for caps in TABLE_REFERENCE.captures_iter(sql) {
            let Some(reference) = caps.get(1) else {
                continue;
            };
            let name = reference
                .as_str()
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']')
                .to_lowercase();
            if !self.allowed_tables.contains(&name) && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }
}

/// Non-empty statements after splitting on `;`
fn statement_count(sql: &str) -> usize {
    sql.split(';').filter(|part| !part.trim().is_empty()).count()
}

/// Statement text with quoted literals and parenthesized groups blanked out,
/// so keyword checks only see the outermost statement
fn top_level(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(' ');
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(' ');
                }
                '(' => {
                    depth += 1;
                    out.push(' ');
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    out.push(' ');
                }
                _ if depth > 0 => out.push(' '),
                _ => out.push(c),
            },
        }
    }
    out
}

fn classify(sql: &str) -> (String, bool) {
    let keyword = sql
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .next()
        .unwrap_or_default()
        .to_uppercase();

    if (keyword == "DELETE" || keyword == "UPDATE") && !WHERE_CLAUSE.is_match(&top_level(sql)) {
        return (format!("{} without WHERE clause", keyword), true);
    }
    let destructive = DESTRUCTIVE_KEYWORDS.contains(&keyword.as_str());
    (keyword, destructive)
}

/// Advisory cost heuristic; never blocks execution
pub fn complexity_score(sql: &str) -> u32 {
    let count = |re: &Regex| re.find_iter(sql).count() as u32;
    10 + count(&JOIN) * 10
        + count(&SUBQUERY) * 15
        + count(&AGGREGATE) * 5
        + count(&UNION) * 10
        + count(&LEADING_WILDCARD_LIKE) * 5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new(false, 100)
    }

    #[test]
    fn test_plain_select_accepted() {
        let verdict = validator().validate("SELECT * FROM users", false);
        assert!(verdict.accepted);
        assert!(verdict.errors.is_empty());
        assert!(verdict.warnings.is_empty());
        assert!(!verdict.is_destructive);
        assert_eq!(verdict.complexity_score, 10);
        assert_eq!(verdict.operation, "SELECT");
    }

    #[test]
    fn test_empty_rejected_immediately() {
        let verdict = validator().validate("   \n ", true);
        assert!(!verdict.accepted);
        assert_eq!(verdict.errors, vec!["Empty query"]);
        assert_eq!(verdict.complexity_score, 0);
    }

    #[test]
    fn test_stacked_statements_rejected_regardless_of_content() {
        for sql in ["SELECT 1; SELECT 2", "SELECT * FROM users;DROP TABLE users", "SELECT 1;x"] {
            let verdict = validator().validate(sql, true);
            assert!(!verdict.accepted, "{}", sql);
            assert!(verdict.errors.iter().any(|e| e == "Multiple SQL statements not allowed"), "{}", sql);
        }
        assert!(validator().validate("SELECT 1;  ", false).accepted);
    }

    #[test]
    fn test_injection_patterns_all_reported() {
        let verdict = validator().validate("SELECT * FROM users -- hi /* there */", false);
        assert!(!verdict.accepted);
        assert_eq!(verdict.errors.len(), 2);

        assert!(!validator().validate("EXEC('x')", false).accepted);
        assert!(!validator().validate("SELECT xp_cmdshell FROM t", false).accepted);
        assert!(!validator().validate("SELECT * FROM t WHERE sp_who = 1", false).accepted);
        assert!(validator().validate("SELECT executed_at FROM jobs", false).accepted);
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let sql = "DELETE FROM users WHERE id = 1";

        let rejected = validator().validate(sql, false);
        assert!(!rejected.accepted);
        assert!(rejected.is_destructive);
        assert!(rejected.requires_confirmation);
        assert!(rejected.errors[0].contains("requires confirmation"));

        let confirmed = validator().validate(sql, true);
        assert!(confirmed.accepted);
        assert!(confirmed.is_destructive);
        assert_eq!(confirmed.warnings, vec!["Destructive operation: DELETE"]);
    }

    #[test]
    fn test_whole_table_mutations() {
        let verdict = validator().validate("delete from users", false);
        assert!(verdict.is_destructive);
        assert_eq!(verdict.operation, "DELETE without WHERE clause");

        let verdict = validator().validate("UPDATE users SET status = 'x'", false);
        assert!(verdict.is_destructive);
        assert_eq!(verdict.operation, "UPDATE without WHERE clause");

        let verdict = validator().validate("UPDATE users SET status = 'x' WHERE id = 2", false);
        assert!(!verdict.is_destructive);
        assert!(verdict.accepted);
    }

    #[test]
    fn test_where_must_be_top_level() {
        for sql in [
            "UPDATE users SET note = 'where'",
            "UPDATE users SET status = (SELECT s FROM defaults WHERE id = 1)",
            "DELETE FROM \"where\"",
        ] {
            let verdict = validator().validate(sql, false);
            assert!(verdict.is_destructive, "{}", sql);
            assert!(verdict.requires_confirmation, "{}", sql);
            assert!(!verdict.accepted, "{}", sql);
            assert!(verdict.operation.ends_with("without WHERE clause"), "{}", sql);
        }

        let nested = "UPDATE users SET status = (SELECT s FROM defaults WHERE id = 1) WHERE id IN (SELECT 2)";
        assert!(!validator().validate(nested, false).is_destructive);
        assert_eq!(top_level("a 'b(c' (d) e"), format!("a{}e", " ".repeat(11)));
    }

    #[test]
    fn test_globally_allowed_destructive() {
        let verdict = SqlValidator::new(true, 100).validate("DROP TABLE users", false);
        assert!(verdict.accepted);
        assert!(verdict.is_destructive);
        assert!(!verdict.requires_confirmation);
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[test]
    fn test_complexity_joins_and_subquery() {
        let sql = "SELECT u.name FROM users u \
                   JOIN orders o ON o.user_id = u.id \
                   JOIN items i ON i.order_id = o.id \
                   JOIN products p ON p.id = i.product_id \
                   WHERE u.id IN (SELECT user_id FROM vip)";
        assert_eq!(complexity_score(sql), 55);
    }

    #[test]
    fn test_complexity_is_advisory() {
        let sql = "SELECT COUNT(*), SUM(total) FROM a JOIN b ON a.id = b.a_id \
                   WHERE name LIKE '%x' GROUP BY a.kind UNION SELECT 1, 2";
        let verdict = SqlValidator::new(false, 20).validate(sql, false);
        assert_eq!(verdict.complexity_score, 10 + 10 + 5 * 3 + 10 + 5);
        assert!(verdict.accepted);
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[test]
    fn test_allowed_tables() {
        let validator = validator().with_allowed_tables(["users", "Orders"]);
        assert!(validator.validate("SELECT * FROM users JOIN orders ON 1 = 1", false).accepted);

        let verdict = validator.validate("SELECT * FROM public.secrets JOIN \"audit\" ON 1 = 1", false);
        assert!(!verdict.accepted);
        assert_eq!(verdict.errors, vec!["Unauthorized tables: secrets, audit"]);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let validator = validator();
        let sql = "UPDATE users SET name = 'a'";
        assert_eq!(validator.validate(sql, false), validator.validate(sql, false));
    }
}
