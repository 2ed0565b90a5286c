//! Grouped view of the changes recorded for one snapshot.

use serde::Serialize;
use std::collections::HashSet;

use crate::model::{ChangeType, ScheduleChange};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    /// Modified field rows
    pub modified: usize,
    /// Distinct classes with at least one modified field
    pub modified_entries: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub schedule_id: i64,
    pub previous_schedule_id: Option<i64>,
    pub counts: ChangeCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ScheduleChange>>,
}

impl ChangeSummary {
    /// Summarises the changes of `schedule_id`. The change list is only
    /// carried along when `include_full` is set.
    pub fn from_changes(schedule_id: i64, changes: &[ScheduleChange], include_full: bool) -> Self {
        let mut counts = ChangeCounts::default();
        let mut modified_keys = HashSet::new();

        for change in changes {
            match change.change_type {
                ChangeType::Added => counts.added += 1,
                ChangeType::Removed => counts.removed += 1,
                ChangeType::Modified => {
                    counts.modified += 1;
                    modified_keys.insert((change.date, &change.time, &change.group, &change.subject));
                }
            }
        }
        counts.modified_entries = modified_keys.len();

        Self {
            schedule_id,
            previous_schedule_id: changes.first().and_then(|c| c.old_schedule_id),
            counts,
            changes: include_full.then(|| changes.to_vec()),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.counts.total() > 0
    }

    /// One-line text for the notification sink.
    pub fn notification_message(&self) -> String {
        format!(
            "Schedule updated: {} classes added, {} removed, {} modified",
            self.counts.added, self.counts.removed, self.counts.modified_entries
        )
    }
}
