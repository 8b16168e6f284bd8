//! Query descriptors and read/write routing decisions.

use serde::Serialize;

use crate::routing::classify::{guess_table, is_read_statement, WriteMemo};
use crate::topology::Operation;

/// A logical query to route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    sql: String,
    table: Option<String>,
    force_master: bool,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            table: None,
            force_master: false,
        }
    }

    /// Name the table explicitly instead of guessing it from the SQL.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Route to the primary regardless of the statement.
    pub fn force_master(mut self) -> Self {
        self.force_master = true;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Explicit table, or the one guessed from the SQL.
    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref().or_else(|| guess_table(&self.sql))
    }

    pub fn is_forced_master(&self) -> bool {
        self.force_master
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

/// Why a query was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    ForcedMaster,
    ForcedSession,
    TableWritten,
    WriteStatement,
    JoinsWrittenTable,
    ReadStatement,
}

/// Outcome of read/write classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub operation: Operation,
    pub reason: Reason,
    /// The table must be added to the write memo.
    pub record_table: bool,
}

/// Decide read or write for `query` given the session memo. Pure; the caller
/// applies `record_table`.
pub fn classify_operation(query: &Query, memo: &WriteMemo) -> Classification {
    let table = query.table_name();
    let is_read = is_read_statement(query.sql());
    let record_table = !is_read && table.is_some();

    let write = |reason| Classification {
        operation: Operation::Write,
        reason,
        record_table,
    };

    if query.is_forced_master() {
        return write(Reason::ForcedMaster);
    }
    if memo.is_forced() {
        return write(Reason::ForcedSession);
    }
    if table.is_some_and(|t| memo.contains(t)) {
        return write(Reason::TableWritten);
    }
    if !is_read {
        return write(Reason::WriteStatement);
    }
    if memo.mentioned_in(query.sql()) {
        return write(Reason::JoinsWrittenTable);
    }

    Classification {
        operation: Operation::Read,
        reason: Reason::ReadStatement,
        record_table: false,
    }
}
