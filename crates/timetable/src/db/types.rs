/// Database types for stored snapshots and the name directory
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::matcher::CandidateKind;
use crate::model::{ChangeType, ClassType, ScheduleChange};

/// A stored snapshot without its entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMeta {
    pub id: i64,
    pub file_hash: String,
    pub file_name: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub entry_count: i64,
    pub is_active: bool,
}

/// Result of saving a new snapshot.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub schedule_id: i64,
    /// Snapshot that was active before the save, if any
    pub previous_id: Option<i64>,
    pub changes: Vec<ScheduleChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instructor {
    pub id: i64,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub aliases: Vec<String>,
}

/// An admin's "don't suggest this again" rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateIgnore {
    pub id: i64,
    pub kind: CandidateKind,
    pub value: String,
    /// Empty means the value is ignored in every context
    pub context: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

fn unknown(what: &str, value: &str) -> FromSqlError {
    FromSqlError::Other(format!("unknown {what} '{value}'").into())
}

impl ToSql for ChangeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChangeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ChangeType::parse(s).ok_or_else(|| unknown("change type", s))
    }
}

impl ToSql for ClassType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ClassType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ClassType::from_keyword(s).ok_or_else(|| unknown("class type", s))
    }
}

impl ToSql for CandidateKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CandidateKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        CandidateKind::parse(s).ok_or_else(|| unknown("candidate kind", s))
    }
}
