use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::model::ParsedSchedule;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// Display filter for the read API. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleFilter {
    pub group: Option<String>,
    pub program: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ScheduleFilter {
    fn is_empty(&self) -> bool {
        self.group.is_none() && self.program.is_none() && self.from.is_none() && self.to.is_none()
    }

    /// Keeps matching entries; sections left without entries are dropped.
    pub fn apply(&self, mut schedule: ParsedSchedule) -> ParsedSchedule {
        if self.is_empty() {
            return schedule;
        }
        let same = |a: &str, b: &str| a.trim().to_lowercase() == b.trim().to_lowercase();

        schedule.sections.retain_mut(|section| {
            if let Some(program) = &self.program {
                if !same(&section.program, program) {
                    return false;
                }
            }
            section.entries.retain(|e| {
                self.group.as_deref().map_or(true, |g| same(&e.group, g))
                    && self.from.map_or(true, |from| e.date >= from)
                    && self.to.map_or(true, |to| e.date <= to)
            });
            if let Some(group) = &self.group {
                section.groups.retain(|g| same(g, group));
            }
            !section.entries.is_empty()
        });
        schedule
    }
}

/// GET /schedule
/// Returns the active snapshot, optionally narrowed by the display filter.
/// `stale` is set when the last sync run failed and cached data is served.
pub async fn get_schedule(
    State(s): State<Arc<AppState>>,
    Query(filter): Query<ScheduleFilter>,
) -> Response {
    info!(filter = ?filter, "GET /schedule");

    let stale = s
        .sync
        .last_report()
        .await
        .map(|r| r.is_stale())
        .unwrap_or(false);

    let active = match s.store.active_id() {
        Ok(Some(id)) => id,
        Ok(None) => {
            return ApiErrorType::from((
                StatusCode::SERVICE_UNAVAILABLE,
                "no data available",
                None,
            ))
            .into_response()
        }
        Err(e) => return ApiErrorType::from(e).into_response(),
    };

    match s.store.load_by_id(active) {
        Ok(schedule) => {
            let schedule = filter.apply(schedule);
            (
                StatusCode::OK,
                Json(json!({
                    "scheduleId": active,
                    "lastUpdated": schedule.last_updated,
                    "fileHash": schedule.file_hash,
                    "fileName": schedule.file_name,
                    "stale": stale,
                    "sections": schedule.sections,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to load schedule {}: {}", active, e);
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /schedules
/// Lists stored snapshots, newest first.
pub async fn get_schedules(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /schedules");

    match s.store.list_schedules() {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// DELETE /schedules/:id
/// Deletes an old snapshot together with its change rows.
pub async fn delete_schedule(Path(id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("DELETE /schedules/{}", id);

    match s.store.delete(id) {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassInfo, ScheduleEntry, ScheduleSection};
    use chrono::Utc;

    fn entry(day: u32, group: &str) -> ScheduleEntry {
        ScheduleEntry {
            id: format!("0-{}-{}", day, group),
            date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
            day_of_week: "sobota".to_string(),
            start_time: "08:00".to_string(),
            end_time: "09:30".to_string(),
            group: group.to_string(),
            class_info: ClassInfo {
                subject: "Matematyka".to_string(),
                class_type: None,
                instructor: None,
                room: None,
                is_remote: false,
                note: None,
            },
        }
    }

    fn section(program: &str, entries: Vec<ScheduleEntry>) -> ScheduleSection {
        ScheduleSection {
            program: program.to_string(),
            degree_level: None,
            year: None,
            semester: None,
            mode: None,
            groups: vec!["DS1".to_string(), "DS2".to_string()],
            entries,
        }
    }

    fn schedule() -> ParsedSchedule {
        ParsedSchedule {
            sections: vec![
                section("Informatyka", vec![entry(5, "DS1"), entry(5, "DS2"), entry(12, "DS1")]),
                section("Matematyka", vec![entry(6, "DS2")]),
            ],
            last_updated: Utc::now(),
            file_hash: "h".to_string(),
            file_name: None,
        }
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filtered = ScheduleFilter::default().apply(schedule());
        assert_eq!(filtered.sections, schedule().sections);
    }

    #[test]
    fn test_group_and_date_filter() {
        let filter = ScheduleFilter {
            group: Some("ds1".to_string()),
            to: NaiveDate::from_ymd_opt(2024, 10, 10),
            ..Default::default()
        };
        let filtered = filter.apply(schedule());
        assert_eq!(filtered.sections.len(), 1);
        assert_eq!(filtered.sections[0].entries.len(), 1);
        assert_eq!(filtered.sections[0].groups, vec!["DS1"]);
    }

    #[test]
    fn test_program_filter() {
        let filter = ScheduleFilter {
            program: Some("matematyka".to_string()),
            ..Default::default()
        };
        let filtered = filter.apply(schedule());
        assert_eq!(filtered.sections.len(), 1);
        assert_eq!(filtered.sections[0].program, "Matematyka");
    }
}
