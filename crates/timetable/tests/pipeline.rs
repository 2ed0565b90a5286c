mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use timetable::config::SyncConfig;
use timetable::db::ScheduleStore;
use timetable::model::{ChangeType, ClassType};
use timetable::notify::NotificationSink;
use timetable::parser::{parse_workbook, ParseOptions, SheetLayout};
use timetable::sync::{ScheduleSync, SyncStatus};

use common::{math_workbook, state, test_config, workbook, FakeSource};

/// Takes longer to deliver than the whole run is allowed to take.
#[derive(Default)]
struct SlowSink {
    delivered: AtomicUsize,
}

impl NotificationSink for SlowSink {
    fn notify(&self, _kind: &str, _title: &str, _body: &str) {
        std::thread::sleep(Duration::from_millis(1500));
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn first_sync_saves_everything_as_added() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let state = state(source);

    let report = state.sync.run(false).await;
    assert_eq!(report.status, SyncStatus::Updated, "{:?}", report.error);

    let summary = report.summary.unwrap();
    assert_eq!(summary.counts.added, 2);
    assert_eq!(summary.counts.total(), 2);
    assert_eq!(report.stats.unwrap().total_entries, 2);

    let schedule = state.store.load().unwrap().unwrap();
    assert_eq!(schedule.sections[0].program, "Informatyka");
    assert_eq!(schedule.file_name.as_deref(), Some("plan.xlsx"));
    let rooms: Vec<_> = schedule
        .entries()
        .map(|e| e.class_info.room.clone().unwrap())
        .collect();
    assert_eq!(rooms, vec!["101", "102"]);

    // No notification for the initial import
    assert!(state.store.recent_notifications(10).unwrap().is_empty());
}

#[tokio::test]
async fn unchanged_file_takes_the_fast_path() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let state = state(source.clone());

    let first = state.sync.run(false).await;
    let second = state.sync.run(false).await;

    assert_eq!(second.status, SyncStatus::Unchanged);
    assert_eq!(second.schedule_id, first.schedule_id);
    assert_eq!(second.file_hash, first.file_hash);
    assert!(second.summary.is_none());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(state.store.list_schedules().unwrap().len(), 1);
}

#[tokio::test]
async fn room_change_is_one_modification() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let state = state(source.clone());
    let first = state.sync.run(false).await;

    source.set_bytes(math_workbook("103"));
    let second = state.sync.run(false).await;
    assert_eq!(second.status, SyncStatus::Updated);

    let id = second.schedule_id.unwrap();
    let changes = state.store.changes_for(id).unwrap();
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.change_type, ChangeType::Modified);
    assert_eq!(change.field_name.as_deref(), Some("room"));
    assert_eq!(change.old_value.as_deref(), Some("102"));
    assert_eq!(change.new_value.as_deref(), Some("103"));
    assert_eq!(change.old_schedule_id, first.schedule_id);
    assert_eq!(change.time, "08:00-09:30");

    let notifications = state.store.recent_notifications(10).unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].body,
        "Schedule updated: 0 classes added, 0 removed, 1 modified"
    );
}

#[tokio::test]
async fn forced_sync_of_same_file_records_no_changes() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let state = state(source);
    let first = state.sync.run(false).await;

    let forced = state.sync.run(true).await;
    assert_eq!(forced.status, SyncStatus::Updated);
    assert_ne!(forced.schedule_id, first.schedule_id);
    assert!(!forced.summary.unwrap().has_changes());
    assert_eq!(state.store.active_id().unwrap(), forced.schedule_id);
}

#[tokio::test]
async fn failed_fetch_without_cache_reports_failure() {
    let source = FakeSource::with_bytes(Vec::new());
    source.fail();
    let state = state(source);

    let report = state.sync.run(false).await;
    assert_eq!(report.status, SyncStatus::Failed);
    assert!(report.error.unwrap().starts_with("no data available"));
    assert!(report.schedule_id.is_none());
}

#[tokio::test]
async fn failures_after_a_good_run_serve_the_cached_snapshot() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let state = state(source.clone());
    let first = state.sync.run(false).await;

    source.fail();
    let report = state.sync.run(false).await;
    assert_eq!(report.status, SyncStatus::Stale);
    assert_eq!(report.schedule_id, first.schedule_id);
    assert!(state.sync.last_report().await.unwrap().is_stale());

    // A file that isn't a workbook doesn't replace the active snapshot either
    source.set_bytes(b"definitely not a spreadsheet".to_vec());
    let report = state.sync.run(false).await;
    assert_eq!(report.status, SyncStatus::Stale);
    assert_eq!(state.store.active_id().unwrap(), first.schedule_id);
    assert_eq!(state.store.list_schedules().unwrap().len(), 1);
}

#[tokio::test]
async fn added_and_removed_classes() {
    let source = FakeSource::with_bytes(workbook(&[
        ("2024-10-05", "sobota", "Matematyka\nJK\ns. 101"),
        ("2024-10-12", "sobota", "Fizyka (wykład)\nAB\ns. 201"),
    ]));
    let state = state(source.clone());
    state.sync.run(false).await;

    source.set_bytes(workbook(&[
        ("2024-10-05", "sobota", "Matematyka\nJK\ns. 101"),
        ("2024-10-19", "sobota", "Chemia\nCD\nzdalnie"),
    ]));
    let report = state.sync.run(false).await;
    let counts = report.summary.unwrap().counts;
    assert_eq!((counts.added, counts.removed, counts.modified), (1, 1, 0));

    let entries = state.store.active_entries().unwrap();
    assert!(entries[1].class_info.is_remote);
    assert_eq!(entries[1].class_info.room, None);
}

#[test]
fn parsing_the_same_file_twice_gives_the_same_schedule() {
    let bytes = math_workbook("102");
    let layout = SheetLayout::default();
    let options = ParseOptions {
        layout: &layout,
        directory: None,
    };

    let first = parse_workbook(&bytes, options).unwrap();
    let second = parse_workbook(&bytes, options).unwrap();
    assert_eq!(first.sections, second.sections);

    let ids: Vec<_> = first.sections[0].entries.iter().map(|e| e.id.clone()).collect();
    let again: Vec<_> = second.sections[0].entries.iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, again);
    assert!(first.sections[0]
        .entries
        .iter()
        .all(|e| e.class_info.class_type == Some(ClassType::Lecture)));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_notification_does_not_fail_a_committed_run() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let store = Arc::new(ScheduleStore::open_in_memory().unwrap());
    let sink = Arc::new(SlowSink::default());
    let config = timetable::config::AppConfig {
        sync: SyncConfig {
            timeout_secs: 1,
            notify_on_change: true,
        },
        ..test_config()
    };
    let sync = ScheduleSync::new(store.clone(), source.clone(), sink.clone(), &config);

    let first = sync.run(false).await;
    assert_eq!(first.status, SyncStatus::Updated);

    source.set_bytes(math_workbook("103"));
    let report = sync.run(false).await;

    assert_eq!(report.status, SyncStatus::Updated, "{:?}", report.error);
    assert!(report.error.is_none());
    assert_eq!(report.schedule_id, store.active_id().unwrap());
    assert_ne!(report.schedule_id, first.schedule_id);
    assert_eq!(report.summary.unwrap().counts.modified, 1);
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
}
