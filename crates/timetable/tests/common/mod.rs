#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use rust_xlsxwriter::Workbook;

use timetable::auth::Role;
use timetable::config::{AppConfig, TokenConfig};
use timetable::db::ScheduleStore;
use timetable::model::RawSpreadsheet;
use timetable::source::{FetchError, ScheduleSource};
use timetable::types::AppState;

/// One class cell: `(date, weekday, cell text)` in the single 08:00-09:30 slot
/// of group DS1.
pub type Row<'a> = (&'a str, &'a str, &'a str);

/// Builds a one-sheet workbook in the published layout.
pub fn workbook(rows: &[Row<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Informatyka").unwrap();
    sheet
        .write_string(0, 0, "Informatyka, studia I stopnia, rok 2, semestr 3, stacjonarne")
        .unwrap();
    sheet.write_string(1, 2, "08:00-09:30").unwrap();
    sheet.write_string(2, 2, "DS1").unwrap();
    for (i, (date, weekday, cell)) in rows.iter().enumerate() {
        let row = 3 + i as u32;
        sheet.write_string(row, 0, *date).unwrap();
        sheet.write_string(row, 1, *weekday).unwrap();
        sheet.write_string(row, 2, *cell).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

/// The two-day Matematyka timetable with the second class in `room`.
pub fn math_workbook(room: &str) -> Vec<u8> {
    let second = format!("Matematyka\nwykład\nJK\ns. {}", room);
    workbook(&[
        ("2024-10-05", "sobota", "Matematyka\nwykład\nJK\ns. 101"),
        ("2024-10-06", "niedziela", second.as_str()),
    ])
}

/// Serves whatever bytes the test put in, or fails on demand.
#[derive(Default)]
pub struct FakeSource {
    bytes: Mutex<Vec<u8>>,
    failing: AtomicBool,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub fn with_bytes(bytes: Vec<u8>) -> Arc<Self> {
        let source = Self::default();
        *source.bytes.lock().unwrap() = bytes;
        Arc::new(source)
    }

    pub fn set_bytes(&self, bytes: Vec<u8>) {
        *self.bytes.lock().unwrap() = bytes;
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl ScheduleSource for FakeSource {
    fn fetch<'a>(&'a self, _filter: Option<&'a str>) -> BoxFuture<'a, Result<RawSpreadsheet, FetchError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(FetchError::Listing {
                message: "connection refused".to_string(),
            })
        } else {
            Ok(RawSpreadsheet {
                buffer: self.bytes.lock().unwrap().clone(),
                filename: "plan.xlsx".to_string(),
                url: "https://www.example.edu.pl/plany/plan.xlsx".to_string(),
            })
        };
        future::ready(result).boxed()
    }
}

pub fn test_config() -> AppConfig {
    let token = |token: &str, user_id, role| TokenConfig {
        token: token.to_string(),
        user_id,
        name: token.to_string(),
        role,
        group: None,
    };
    AppConfig {
        tokens: vec![
            token("admin", 1, Role::Admin),
            token("student", 2, Role::User),
        ],
        ..AppConfig::default()
    }
}

/// App state over an in-memory store and the given source.
pub fn state(source: Arc<FakeSource>) -> Arc<AppState> {
    let store = Arc::new(ScheduleStore::open_in_memory().unwrap());
    Arc::new(AppState::new(&test_config(), store, source))
}
