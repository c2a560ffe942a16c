//! Upsert statements and their conflict-resolution policies.
//!
//! A [`MergePolicy`] states what happens to each non-key column when an
//! incoming row collides with an existing one on its natural key. The same
//! policy has an in-memory form ([`MergePolicy::merge`]) and a SQL form
//! (rendered by [`UpsertStatement`]); tests hold the two in agreement.

use serde::{Deserialize, Serialize};

/// Per-column conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Keep the existing row untouched.
    Ignore,
    /// Take a non-null incoming value; keep the existing one otherwise.
    FillGaps,
    /// Always take the incoming value.
    LastWriteWins,
}

impl MergePolicy {
    /// Resolve one column of a conflicting row.
    pub fn merge<T>(self, existing: Option<T>, incoming: Option<T>) -> Option<T> {
        match self {
            MergePolicy::Ignore => existing,
            MergePolicy::FillGaps => incoming.or(existing),
            MergePolicy::LastWriteWins => incoming,
        }
    }

    /// SQL assignment for `column` in a `DO UPDATE SET` clause.
    fn assignment(self, table: &str, column: &str) -> Option<String> {
        match self {
            MergePolicy::Ignore => None,
            MergePolicy::FillGaps => Some(format!(
                "{column} = COALESCE(excluded.{column}, {table}.{column})"
            )),
            MergePolicy::LastWriteWins => Some(format!("{column} = excluded.{column}")),
        }
    }
}

/// An `INSERT ... ON CONFLICT` statement against a natural-key constraint.
#[derive(Debug, Clone, Copy)]
pub struct UpsertStatement<'a> {
    pub table: &'a str,
    /// Inserted columns, natural key included.
    pub columns: &'a [&'a str],
    /// Columns of the declared uniqueness constraint.
    pub conflict_target: &'a [&'a str],
    pub policy: MergePolicy,
}

impl UpsertStatement<'_> {
    /// Statement taking one row of positional parameters.
    pub fn values_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) {}",
            self.table,
            self.columns.join(", "),
            placeholders,
            self.on_conflict()
        )
    }

    /// Statement inserting the rows of `select`, whose output columns must
    /// line up with [`Self::columns`].
    ///
    /// SQLite needs a WHERE clause in the SELECT to parse the upsert clause
    /// unambiguously; callers always provide one.
    pub fn select_sql(&self, select: &str) -> String {
        format!(
            "INSERT INTO {} ({})\n{}\n{}",
            self.table,
            self.columns.join(", "),
            select.trim(),
            self.on_conflict()
        )
    }

    fn on_conflict(&self) -> String {
        let target = self.conflict_target.join(", ");
        let updates = self
            .columns
            .iter()
            .filter(|c| !self.conflict_target.contains(*c))
            .filter_map(|c| self.policy.assignment(self.table, c))
            .collect::<Vec<_>>();
        if updates.is_empty() {
            format!("ON CONFLICT ({target}) DO NOTHING")
        } else {
            format!("ON CONFLICT ({target}) DO UPDATE SET {}", updates.join(", "))
        }
    }
}
