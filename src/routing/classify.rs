//! Read/write classification of SQL text and the session write memo.
//!
//! # Responsibilities
//! - Extract the leading statement verb
//! - Guess the primary table when the caller does not name one
//! - Track tables written during the session (write stickiness)
//!
//! # Design Decisions
//! - No SQL parser: a verb and a table name are all routing needs
//! - Memo entries are added, never removed, for the life of the session

use std::collections::HashSet;

/// Verbs that may be served by a replica.
const READ_VERBS: [&str; 5] = ["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// How much query text the join-safety check scans.
pub const JOIN_CHECK_WINDOW: usize = 1000;

/// The leading statement verb, after stripping whitespace and parentheses.
pub fn leading_verb(sql: &str) -> &str {
    let rest = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// True when the statement can be served by a replica.
pub fn is_read_statement(sql: &str) -> bool {
    let verb = leading_verb(sql);
    READ_VERBS.iter().any(|v| v.eq_ignore_ascii_case(verb))
}

fn tokens(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';'))
        .filter(|t| !t.is_empty())
}

fn unquote(ident: &str) -> &str {
    ident.trim_matches(|c| c == '`' || c == '"')
}

fn token_after<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let mut iter = tokens(sql);
    while let Some(tok) = iter.next() {
        if tok.eq_ignore_ascii_case(keyword) {
            return iter.next().map(unquote).filter(|t| !t.is_empty());
        }
    }
    None
}

/// Best-effort guess of the table a statement is about.
pub fn guess_table(sql: &str) -> Option<&str> {
    let verb = leading_verb(sql).to_ascii_uppercase();
    match verb.as_str() {
        "INSERT" | "REPLACE" => token_after(sql, "INTO"),
        "UPDATE" => tokens(sql)
            .skip(1)
            .find(|t| !t.eq_ignore_ascii_case("LOW_PRIORITY") && !t.eq_ignore_ascii_case("IGNORE"))
            .map(unquote),
        "DESCRIBE" | "DESC" => tokens(sql).nth(1).map(unquote),
        _ => token_after(sql, "FROM")
            .or_else(|| token_after(sql, "JOIN"))
            .or_else(|| token_after(sql, "INTO")),
    }
}

/// Session-scoped record of tables that must be read from the primary.
#[derive(Debug, Clone, Default)]
pub struct WriteMemo {
    tables: HashSet<String>,
    force_primary: bool,
}

impl WriteMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a table to the primary for the rest of the session.
    pub fn mark(&mut self, table: &str) -> bool {
        self.tables.insert(table.to_ascii_lowercase())
    }

    /// Send every subsequent read to the primary.
    pub fn force_all(&mut self) {
        self.force_primary = true;
    }

    pub fn is_forced(&self) -> bool {
        self.force_primary
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(&table.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    /// Conservative join check: does the head of the query mention any memo table?
    pub fn mentioned_in(&self, sql: &str) -> bool {
        if self.tables.is_empty() {
            return false;
        }
        let head: String = sql.chars().take(JOIN_CHECK_WINDOW).collect::<String>().to_ascii_lowercase();
        self.tables.iter().any(|t| head.contains(t.as_str()))
    }
}
