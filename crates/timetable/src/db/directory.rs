//! Instructor and subject directory, their relation and candidate ignores.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use tracing::info;

use super::{CandidateIgnore, Instructor, ScheduleStore, StoreError, Subject};
use crate::matcher::{CandidateKind, DirectoryIndex};

/// The two name tables share a shape.
#[derive(Clone, Copy)]
enum NameTable {
    Instructors,
    Subjects,
}

impl NameTable {
    fn table(self) -> &'static str {
        match self {
            NameTable::Instructors => "instructors",
            NameTable::Subjects => "subjects",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            NameTable::Instructors => "instructor_id",
            NameTable::Subjects => "subject_id",
        }
    }

    fn entity(self) -> &'static str {
        match self {
            NameTable::Instructors => "Instructor",
            NameTable::Subjects => "Subject",
        }
    }
}

type NameRecord = (i64, String, Vec<String>);

/// Trimmed, non-empty, first spelling wins.
fn clean_aliases(aliases: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    aliases
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty() && seen.insert(a.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn insert_name(
    db: &Connection,
    table: NameTable,
    name: &str,
    aliases: &[String],
) -> Result<NameRecord, StoreError> {
    let name = name.trim().to_string();
    let aliases = clean_aliases(aliases);
    db.execute(
        &format!("INSERT INTO {} (name, aliases) VALUES (?1, ?2)", table.table()),
        params![name, serde_json::to_string(&aliases)?],
    )?;
    Ok((db.last_insert_rowid(), name, aliases))
}

fn get_name(db: &Connection, table: NameTable, id: i64) -> Result<NameRecord, StoreError> {
    let row = db
        .query_row(
            &format!(
                "SELECT name, aliases FROM {} WHERE {} = ?1",
                table.table(),
                table.id_column()
            ),
            [id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    match row {
        Some((name, aliases)) => Ok((id, name, serde_json::from_str(&aliases)?)),
        None => Err(StoreError::NotFound {
            entity: table.entity(),
            id,
        }),
    }
}

fn list_names(db: &Connection, table: NameTable) -> Result<Vec<NameRecord>, StoreError> {
    let mut stmt = db.prepare(&format!(
        "SELECT {}, name, aliases FROM {} ORDER BY name",
        table.id_column(),
        table.table()
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, name, aliases)| Ok((id, name, serde_json::from_str(&aliases)?)))
        .collect()
}

fn set_aliases(
    db: &Connection,
    table: NameTable,
    id: i64,
    aliases: &[String],
) -> Result<NameRecord, StoreError> {
    let aliases = clean_aliases(aliases);
    let updated = db.execute(
        &format!(
            "UPDATE {} SET aliases = ?1 WHERE {} = ?2",
            table.table(),
            table.id_column()
        ),
        params![serde_json::to_string(&aliases)?, id],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound {
            entity: table.entity(),
            id,
        });
    }
    get_name(db, table, id)
}

fn to_instructor((id, name, aliases): NameRecord) -> Instructor {
    Instructor { id, name, aliases }
}

fn to_subject((id, name, aliases): NameRecord) -> Subject {
    Subject { id, name, aliases }
}

impl ScheduleStore {
    pub fn add_instructor(&self, name: &str, aliases: &[String]) -> Result<Instructor, StoreError> {
        let db = self.conn()?;
        let instructor = to_instructor(insert_name(&db, NameTable::Instructors, name, aliases)?);
        info!(instructor_id = instructor.id, name = %instructor.name, "Added instructor");
        Ok(instructor)
    }

    pub fn get_instructor(&self, id: i64) -> Result<Instructor, StoreError> {
        let db = self.conn()?;
        get_name(&db, NameTable::Instructors, id).map(to_instructor)
    }

    pub fn list_instructors(&self) -> Result<Vec<Instructor>, StoreError> {
        let db = self.conn()?;
        Ok(list_names(&db, NameTable::Instructors)?
            .into_iter()
            .map(to_instructor)
            .collect())
    }

    /// Replaces the alias list of an instructor.
    pub fn set_instructor_aliases(&self, id: i64, aliases: &[String]) -> Result<Instructor, StoreError> {
        let db = self.conn()?;
        set_aliases(&db, NameTable::Instructors, id, aliases).map(to_instructor)
    }

    pub fn add_subject(&self, name: &str, aliases: &[String]) -> Result<Subject, StoreError> {
        let db = self.conn()?;
        let subject = to_subject(insert_name(&db, NameTable::Subjects, name, aliases)?);
        info!(subject_id = subject.id, name = %subject.name, "Added subject");
        Ok(subject)
    }

    pub fn get_subject(&self, id: i64) -> Result<Subject, StoreError> {
        let db = self.conn()?;
        get_name(&db, NameTable::Subjects, id).map(to_subject)
    }

    pub fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let db = self.conn()?;
        Ok(list_names(&db, NameTable::Subjects)?
            .into_iter()
            .map(to_subject)
            .collect())
    }

    /// Replaces the alias list of a subject.
    pub fn set_subject_aliases(&self, id: i64, aliases: &[String]) -> Result<Subject, StoreError> {
        let db = self.conn()?;
        set_aliases(&db, NameTable::Subjects, id, aliases).map(to_subject)
    }

    /// Records that `instructor_id` teaches `subject_id`. Returns `false` if
    /// the link already existed.
    pub fn link_subject_instructor(&self, subject_id: i64, instructor_id: i64) -> Result<bool, StoreError> {
        let db = self.conn()?;
        get_name(&db, NameTable::Subjects, subject_id)?;
        get_name(&db, NameTable::Instructors, instructor_id)?;

        let inserted = db.execute(
            "INSERT OR IGNORE INTO subject_instructors (subject_id, instructor_id) VALUES (?1, ?2)",
            [subject_id, instructor_id],
        )?;
        if inserted > 0 {
            info!(subject_id, instructor_id, "Linked subject and instructor");
        }
        Ok(inserted > 0)
    }

    /// Every `(subject_id, instructor_id)` pair.
    pub fn subject_instructor_links(&self) -> Result<HashSet<(i64, i64)>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT subject_id, instructor_id FROM subject_instructors")?;
        let links = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(links)
    }

    pub fn add_candidate_ignore(
        &self,
        kind: CandidateKind,
        value: &str,
        context: &str,
        reason: Option<&str>,
    ) -> Result<CandidateIgnore, StoreError> {
        let db = self.conn()?;
        let value = value.trim();
        let context = context.trim();
        db.execute(
            "INSERT INTO candidate_ignores (kind, value, context, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![kind, value, context, reason, Utc::now()],
        )?;
        Ok(CandidateIgnore {
            id: db.last_insert_rowid(),
            kind,
            value: value.to_string(),
            context: context.to_string(),
            reason: reason.map(str::to_string),
        })
    }

    pub fn list_candidate_ignores(&self) -> Result<Vec<CandidateIgnore>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT ignore_id, kind, value, context, reason FROM candidate_ignores ORDER BY ignore_id",
        )?;
        let ignores = stmt
            .query_map([], |row| {
                Ok(CandidateIgnore {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    value: row.get(2)?,
                    context: row.get(3)?,
                    reason: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ignores)
    }

    /// Snapshot of the directory for name lookups.
    pub fn directory_index(&self) -> Result<DirectoryIndex, StoreError> {
        let instructors = self.list_instructors()?;
        let subjects = self.list_subjects()?;
        Ok(DirectoryIndex::new(&instructors, &subjects))
    }
}
