//! Structural diff between two snapshots, keyed by natural key.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::model::{ChangeType, NaturalKey, ScheduleEntry};

/// A change before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub change_type: ChangeType,
    pub field_name: Option<&'static str>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub key: NaturalKey,
}

/// First entry per natural key; later duplicates are reported and ignored.
fn index_by_key<'a>(
    entries: impl IntoIterator<Item = &'a ScheduleEntry>,
    side: &str,
) -> (Vec<NaturalKey>, HashMap<NaturalKey, &'a ScheduleEntry>) {
    let mut order = Vec::new();
    let mut map = HashMap::new();
    for entry in entries {
        let key = entry.natural_key();
        if map.contains_key(&key) {
            warn!(key = %key, side, "Duplicate natural key ignored by diff");
            continue;
        }
        order.push(key.clone());
        map.insert(key, entry);
    }
    (order, map)
}

/// Computes the changes turning `old` into `new`.
///
/// Keys only in `new` are `added`, keys only in `old` are `removed`, and keys
/// in both yield one `modified` record per differing field among instructor,
/// room and the remote flag. Unchanged keys produce nothing.
pub fn diff_entries<'a>(
    old: impl IntoIterator<Item = &'a ScheduleEntry>,
    new: impl IntoIterator<Item = &'a ScheduleEntry>,
) -> Vec<ChangeRecord> {
    let (old_order, old_map) = index_by_key(old, "old");
    let (new_order, new_map) = index_by_key(new, "new");
    let mut changes = Vec::new();

    for key in &new_order {
        let new_entry = new_map[key];
        match old_map.get(key) {
            None => changes.push(ChangeRecord {
                change_type: ChangeType::Added,
                field_name: None,
                old_value: None,
                new_value: Some(describe(new_entry)),
                key: key.clone(),
            }),
            Some(old_entry) => changes.extend(field_changes(old_entry, new_entry, key)),
        }
    }

    let new_keys: HashSet<&NaturalKey> = new_order.iter().collect();
    for key in old_order.iter().filter(|k| !new_keys.contains(k)) {
        changes.push(ChangeRecord {
            change_type: ChangeType::Removed,
            field_name: None,
            old_value: Some(describe(old_map[key])),
            new_value: None,
            key: key.clone(),
        });
    }

    changes
}

fn field_changes(old: &ScheduleEntry, new: &ScheduleEntry, key: &NaturalKey) -> Vec<ChangeRecord> {
    let old_info = &old.class_info;
    let new_info = &new.class_info;
    let fields = [
        ("instructor", old_info.instructor.clone(), new_info.instructor.clone()),
        ("room", old_info.room.clone(), new_info.room.clone()),
        (
            "is_remote",
            Some(old_info.is_remote.to_string()),
            Some(new_info.is_remote.to_string()),
        ),
    ];

    fields
        .into_iter()
        .filter(|(_, old_value, new_value)| old_value != new_value)
        .map(|(field, old_value, new_value)| ChangeRecord {
            change_type: ChangeType::Modified,
            field_name: Some(field),
            old_value,
            new_value,
            key: key.clone(),
        })
        .collect()
}

/// Short human-readable summary used as the value of added/removed changes.
fn describe(entry: &ScheduleEntry) -> String {
    let info = &entry.class_info;
    let mut parts = vec![info.subject.clone()];
    if let Some(t) = info.class_type {
        parts.push(t.to_string());
    }
    if let Some(instructor) = &info.instructor {
        parts.push(instructor.clone());
    }
    if info.is_remote {
        parts.push("zdalnie".to_string());
    } else if let Some(room) = &info.room {
        parts.push(room.clone());
    }
    parts.join(", ")
}
