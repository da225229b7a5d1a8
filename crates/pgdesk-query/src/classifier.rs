//! Keyword-level statement classification
//!
//! The executor only needs to know whether the statement it just ran replaces
//! the result grid or merely mutates rows, and if the latter, which table.

use once_cell::sync::Lazy;
use pgdesk_core::TableId;
use regex::Regex;

const IDENT: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][\w$]*)"#;

static INSERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^INSERT\s+INTO\s+({IDENT}(?:\s*\.\s*{IDENT})?)"))
        .expect("insert pattern is valid")
});

static UPDATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^UPDATE\s+(?:ONLY\s+)?({IDENT}(?:\s*\.\s*{IDENT})?)"))
        .expect("update pattern is valid")
});

static DELETE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)^DELETE\s+FROM\s+(?:ONLY\s+)?({IDENT}(?:\s*\.\s*{IDENT})?)"))
        .expect("delete pattern is valid")
});

static RETURNING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bRETURNING\b").expect("returning pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// What a statement does to the result grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// Produces a result set that replaces the grid (SELECT, WITH, SHOW,
    /// EXPLAIN, or a mutation with RETURNING)
    Query,
    /// INSERT/UPDATE/DELETE without RETURNING. `table` is the target as written,
    /// possibly schema-qualified and quoted.
    Mutation { kind: MutationKind, table: String },
    /// DDL, utility statements, anything else
    Other,
}

impl StatementKind {
    pub fn is_mutation(&self) -> bool {
        matches!(self, StatementKind::Mutation { .. })
    }
}

/// Classification seam used by the query executor
pub trait StatementAnalyzer: Send + Sync {
    /// Classify the effective (last) statement of `sql`
    fn classify(&self, sql: &str) -> StatementKind;
}

/// Default analyzer based on leading keywords
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn classify_statement(statement: &str) -> StatementKind {
        let body = strip_leading_comments(statement);
        let upper = body.to_uppercase();

        if upper.starts_with("SELECT")
            || upper.starts_with("WITH")
            || upper.starts_with("SHOW")
            || upper.starts_with("EXPLAIN")
            || upper.starts_with("VALUES")
            || upper.starts_with("TABLE")
        {
            return StatementKind::Query;
        }

        let mutation = [
            (&*INSERT_RE, MutationKind::Insert),
            (&*UPDATE_RE, MutationKind::Update),
            (&*DELETE_RE, MutationKind::Delete),
        ]
        .into_iter()
        .find_map(|(re, kind)| {
            re.captures(body)
                .and_then(|caps| caps.get(1))
                .map(|m| (kind, m.as_str().to_string()))
        });

        match mutation {
            Some(_) if RETURNING_RE.is_match(&code_only(body)) => StatementKind::Query,
            Some((kind, table)) => StatementKind::Mutation { kind, table },
            None => StatementKind::Other,
        }
    }
}

impl StatementAnalyzer for KeywordAnalyzer {
    fn classify(&self, sql: &str) -> StatementKind {
        let kind = split_statements(sql)
            .last()
            .map(|s| Self::classify_statement(s))
            .unwrap_or(StatementKind::Other);
        tracing::trace!(?kind, sql_preview = %sql.chars().take(50).collect::<String>(), "classified statement");
        kind
    }
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(pos) => after[pos + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(pos) => after[pos + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// `sql` with string literals, quoted identifiers and comments blanked out,
/// leaving only text a keyword search may match
fn code_only(sql: &str) -> String {
    let mut code = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                while let Some(sc) = chars.next() {
                    if sc == c && chars.next_if_eq(&c).is_none() {
                        break;
                    }
                }
                code.push_str("  ");
            }
            '-' if chars.peek() == Some(&'-') => {
                for sc in chars.by_ref() {
                    if sc == '\n' {
                        break;
                    }
                }
                code.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for sc in chars.by_ref() {
                    if prev == '*' && sc == '/' {
                        break;
                    }
                    prev = sc;
                }
                code.push(' ');
            }
            _ => code.push(c),
        }
    }
    code
}

fn unquote(identifier: &str) -> String {
    let trimmed = identifier.trim();
    match trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => trimmed.to_string(),
    }
}

/// Whether a mutated table name as written in SQL refers to `displayed`.
///
/// Comparison ignores case and any schema qualifier.
pub fn table_name_matches(mutated: &str, displayed: &TableId) -> bool {
    let unqualified = split_qualified(mutated).pop().unwrap_or_default();
    unqualified.eq_ignore_ascii_case(&displayed.name)
}

fn split_qualified(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in name.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '.' if !in_quotes => parts.push(unquote(&std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    parts.push(unquote(&current));
    parts
}

/// Split SQL into statements on semicolons outside strings, quoted
/// identifiers and comments. Empty statements are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    let mut push_current = |current: &mut String| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            statements.push(trimmed.to_string());
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                current.push(c);
                while let Some(sc) = chars.next() {
                    current.push(sc);
                    if sc == c {
                        // doubled quote is an escape
                        match chars.next_if_eq(&c) {
                            Some(escaped) => current.push(escaped),
                            None => break,
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                current.push(c);
                for sc in chars.by_ref() {
                    current.push(sc);
                    if sc == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                let mut prev = '\0';
                for sc in chars.by_ref() {
                    current.push(sc);
                    if prev == '*' && sc == '/' {
                        break;
                    }
                    prev = sc;
                }
            }
            ';' => push_current(&mut current),
            _ => current.push(c),
        }
    }
    push_current(&mut current);

    statements
}
