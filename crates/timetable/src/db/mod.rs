//! Snapshot persistence with change detection.
//!
//! Every successful sync appends a snapshot. Saving diffs the new snapshot
//! against the active one inside the same transaction, so either the snapshot
//! and all of its change rows land together or nothing does.

mod diff;
mod directory;
mod error;
mod types;

pub use diff::{diff_entries, ChangeRecord};
pub use error::StoreError;
pub use types::{CandidateIgnore, Instructor, Notification, SaveOutcome, ScheduleMeta, Subject};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::model::{ClassInfo, ParsedSchedule, ScheduleChange, ScheduleEntry, ScheduleSection};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_schedules.sql");

const ACTIVE_SCHEDULE_SQL: &str =
    "SELECT schedule_id, created_at FROM schedules ORDER BY created_at DESC, schedule_id DESC LIMIT 1";

const CHANGE_COLUMNS: &str = "change_id, old_schedule_id, new_schedule_id, change_type, field_name,
     old_value, new_value, date, time, group_name, subject, created_at";

pub struct ScheduleStore {
    db: Mutex<Connection>,
}

impl ScheduleStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    /// Private database, used by tests and one-off runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Persists `schedule` as the new active snapshot and records its
    /// differences from the previously active one.
    pub fn save(&self, schedule: &ParsedSchedule) -> Result<SaveOutcome, StoreError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let previous = active_schedule(&tx)?;
        let now = Utc::now();
        // Keep the new snapshot the most recent one even if the clock stepped back
        let created_at = match previous {
            Some((_, prev_created)) if prev_created > now => prev_created,
            _ => now,
        };

        tx.execute(
            "INSERT INTO schedules (file_hash, file_name, last_updated, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                schedule.file_hash,
                schedule.file_name,
                schedule.last_updated,
                created_at
            ],
        )?;
        let schedule_id = tx.last_insert_rowid();

        for (position, section) in schedule.sections.iter().enumerate() {
            insert_section(&tx, schedule_id, position, section)?;
        }

        let previous_id = previous.map(|(id, _)| id);
        let old_entries: Vec<ScheduleEntry> = match previous_id {
            Some(id) => load_entries(&tx, id)?.into_iter().map(|(_, e)| e).collect(),
            None => Vec::new(),
        };

        let records = diff_entries(&old_entries, schedule.entries());
        let mut changes = Vec::with_capacity(records.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO schedule_changes (
                    old_schedule_id, new_schedule_id, change_type, field_name,
                    old_value, new_value, date, time, group_name, subject, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for record in records {
                stmt.execute(params![
                    previous_id,
                    schedule_id,
                    record.change_type,
                    record.field_name,
                    record.old_value,
                    record.new_value,
                    record.key.date,
                    record.key.time,
                    record.key.group,
                    record.key.subject,
                    created_at,
                ])?;
                changes.push(ScheduleChange {
                    id: tx.last_insert_rowid(),
                    old_schedule_id: previous_id,
                    new_schedule_id: schedule_id,
                    change_type: record.change_type,
                    field_name: record.field_name.map(str::to_string),
                    old_value: record.old_value,
                    new_value: record.new_value,
                    date: record.key.date,
                    time: record.key.time,
                    group: record.key.group,
                    subject: record.key.subject,
                    created_at,
                });
            }
        }

        tx.commit()?;

        info!(
            schedule_id,
            previous_id = ?previous_id,
            entries = schedule.entry_count(),
            changes = changes.len(),
            "Saved schedule snapshot"
        );

        Ok(SaveOutcome {
            schedule_id,
            previous_id,
            changes,
        })
    }

    /// The active snapshot, if any has been saved.
    pub fn load(&self) -> Result<Option<ParsedSchedule>, StoreError> {
        let db = self.conn()?;
        match active_schedule(&db)? {
            Some((id, _)) => load_schedule(&db, id).map(Some),
            None => Ok(None),
        }
    }

    pub fn load_by_id(&self, id: i64) -> Result<ParsedSchedule, StoreError> {
        let db = self.conn()?;
        load_schedule(&db, id)
    }

    /// Fingerprint of the active snapshot.
    pub fn latest_hash(&self) -> Result<Option<String>, StoreError> {
        let db = self.conn()?;
        let hash = db
            .query_row(
                "SELECT file_hash FROM schedules ORDER BY created_at DESC, schedule_id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn active_id(&self) -> Result<Option<i64>, StoreError> {
        let db = self.conn()?;
        Ok(active_schedule(&db)?.map(|(id, _)| id))
    }

    /// Entries of the active snapshot in sheet order.
    pub fn active_entries(&self) -> Result<Vec<ScheduleEntry>, StoreError> {
        Ok(self
            .load()?
            .map(|s| s.sections.into_iter().flat_map(|sec| sec.entries).collect())
            .unwrap_or_default())
    }

    /// All snapshots, newest first.
    pub fn list_schedules(&self) -> Result<Vec<ScheduleMeta>, StoreError> {
        let db = self.conn()?;
        let active = active_schedule(&db)?.map(|(id, _)| id);
        let mut stmt = db.prepare(
            "SELECT s.schedule_id, s.file_hash, s.file_name, s.last_updated, s.created_at,
                    (SELECT COUNT(*) FROM schedule_entries e WHERE e.schedule_id = s.schedule_id)
             FROM schedules s
             ORDER BY s.created_at DESC, s.schedule_id DESC",
        )?;

        let schedules = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                Ok(ScheduleMeta {
                    id,
                    file_hash: row.get(1)?,
                    file_name: row.get(2)?,
                    last_updated: row.get(3)?,
                    created_at: row.get(4)?,
                    entry_count: row.get(5)?,
                    is_active: active == Some(id),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Removes a snapshot with its entries and every change row that
    /// references it. The active snapshot can't be deleted.
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        if !schedule_exists(&tx, id)? {
            return Err(StoreError::NotFound {
                entity: "Schedule",
                id,
            });
        }
        if active_schedule(&tx)?.map(|(active, _)| active) == Some(id) {
            return Err(StoreError::ActiveSchedule { id });
        }

        let changes = tx.execute(
            "DELETE FROM schedule_changes WHERE old_schedule_id = ?1 OR new_schedule_id = ?1",
            [id],
        )?;
        let entries = tx.execute("DELETE FROM schedule_entries WHERE schedule_id = ?1", [id])?;
        tx.execute("DELETE FROM schedule_sections WHERE schedule_id = ?1", [id])?;
        tx.execute("DELETE FROM schedules WHERE schedule_id = ?1", [id])?;
        tx.commit()?;

        info!(schedule_id = id, entries, changes, "Deleted schedule snapshot");
        Ok(())
    }

    /// Changes recorded when snapshot `schedule_id` was saved.
    pub fn changes_for(&self, schedule_id: i64) -> Result<Vec<ScheduleChange>, StoreError> {
        let db = self.conn()?;
        if !schedule_exists(&db, schedule_id)? {
            return Err(StoreError::NotFound {
                entity: "Schedule",
                id: schedule_id,
            });
        }
        changes_for(&db, schedule_id)
    }

    /// Changes that produced the active snapshot, with its id.
    pub fn latest_changes(&self) -> Result<Option<(i64, Vec<ScheduleChange>)>, StoreError> {
        let db = self.conn()?;
        match active_schedule(&db)? {
            Some((id, _)) => Ok(Some((id, changes_for(&db, id)?))),
            None => Ok(None),
        }
    }

    pub fn insert_notification(&self, kind: &str, title: &str, body: &str) -> Result<i64, StoreError> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO notifications (kind, title, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![kind, title, body, Utc::now()],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Most recent notifications first.
    pub fn recent_notifications(&self, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT notification_id, kind, title, body, created_at
             FROM notifications ORDER BY notification_id DESC LIMIT ?1",
        )?;
        let notifications = stmt
            .query_map([limit as i64], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    title: row.get(2)?,
                    body: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }
}

fn active_schedule(db: &Connection) -> Result<Option<(i64, DateTime<Utc>)>, StoreError> {
    let row = db
        .query_row(ACTIVE_SCHEDULE_SQL, [], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    Ok(row)
}

fn schedule_exists(db: &Connection, id: i64) -> Result<bool, StoreError> {
    let count: i64 = db.query_row(
        "SELECT COUNT(*) FROM schedules WHERE schedule_id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_section(
    db: &Connection,
    schedule_id: i64,
    position: usize,
    section: &ScheduleSection,
) -> Result<(), StoreError> {
    let groups_json = serde_json::to_string(&section.groups)?;
    db.execute(
        "INSERT INTO schedule_sections (
            schedule_id, position, program, degree_level, year, semester, mode, groups
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            schedule_id,
            position as i64,
            section.program,
            section.degree_level,
            section.year,
            section.semester,
            section.mode,
            groups_json,
        ],
    )?;
    let section_pk = db.last_insert_rowid();

    let mut stmt = db.prepare(
        "INSERT INTO schedule_entries (
            schedule_id, section_pk, entry_id, date, day_of_week, start_time, end_time,
            group_name, subject, class_type, instructor, room, is_remote, note,
            program, degree_level, year, semester, mode
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
    )?;
    for entry in &section.entries {
        let info = &entry.class_info;
        stmt.execute(params![
            schedule_id,
            section_pk,
            entry.id,
            entry.date,
            entry.day_of_week,
            entry.start_time,
            entry.end_time,
            entry.group,
            info.subject,
            info.class_type,
            info.instructor,
            info.room,
            info.is_remote,
            info.note,
            section.program,
            section.degree_level,
            section.year,
            section.semester,
            section.mode,
        ])?;
    }
    debug!(schedule_id, section_pk, entries = section.entries.len(), "Inserted section");
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleEntry> {
    let date: NaiveDate = row.get(1)?;
    Ok(ScheduleEntry {
        id: row.get(0)?,
        date,
        day_of_week: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        group: row.get(5)?,
        class_info: ClassInfo {
            subject: row.get(6)?,
            class_type: row.get(7)?,
            instructor: row.get(8)?,
            room: row.get(9)?,
            is_remote: row.get(10)?,
            note: row.get(11)?,
        },
    })
}

/// Entries of a snapshot in insertion order, tagged with their section.
fn load_entries(db: &Connection, schedule_id: i64) -> Result<Vec<(i64, ScheduleEntry)>, StoreError> {
    let mut stmt = db.prepare(
        "SELECT entry_id, date, day_of_week, start_time, end_time, group_name, subject,
                class_type, instructor, room, is_remote, note, section_pk
         FROM schedule_entries WHERE schedule_id = ?1 ORDER BY entry_pk",
    )?;
    let entries = stmt
        .query_map([schedule_id], |row| Ok((row.get(12)?, entry_from_row(row)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn load_schedule(db: &Connection, id: i64) -> Result<ParsedSchedule, StoreError> {
    let header = db
        .query_row(
            "SELECT file_hash, file_name, last_updated FROM schedules WHERE schedule_id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((file_hash, file_name, last_updated)) = header else {
        return Err(StoreError::NotFound {
            entity: "Schedule",
            id,
        });
    };

    let mut entries: HashMap<i64, Vec<ScheduleEntry>> = HashMap::new();
    for (section_pk, entry) in load_entries(db, id)? {
        entries.entry(section_pk).or_default().push(entry);
    }
    let mut stmt = db.prepare(
        "SELECT section_pk, program, degree_level, year, semester, mode, groups
         FROM schedule_sections WHERE schedule_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, Option<u32>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sections = Vec::with_capacity(rows.len());
    for (section_pk, program, degree_level, year, semester, mode, groups) in rows {
        sections.push(ScheduleSection {
            program,
            degree_level,
            year,
            semester,
            mode,
            groups: serde_json::from_str(&groups)?,
            entries: entries.remove(&section_pk).unwrap_or_default(),
        });
    }

    Ok(ParsedSchedule {
        sections,
        last_updated,
        file_hash,
        file_name,
    })
}

fn changes_for(db: &Connection, schedule_id: i64) -> Result<Vec<ScheduleChange>, StoreError> {
    let mut stmt = db.prepare(&format!(
        "SELECT {CHANGE_COLUMNS} FROM schedule_changes WHERE new_schedule_id = ?1 ORDER BY change_id"
    ))?;
    let changes = stmt
        .query_map([schedule_id], |row| {
            Ok(ScheduleChange {
                id: row.get(0)?,
                old_schedule_id: row.get(1)?,
                new_schedule_id: row.get(2)?,
                change_type: row.get(3)?,
                field_name: row.get(4)?,
                old_value: row.get(5)?,
                new_value: row.get(6)?,
                date: row.get(7)?,
                time: row.get(8)?,
                group: row.get(9)?,
                subject: row.get(10)?,
                created_at: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(changes)
}
