/// Spreadsheet parser turning the published workbook into schedule sections
mod cell;
mod error;
mod grid;

pub use cell::{decompose, ParsedCell, TimeRange};
pub use error::ParseError;
pub use grid::{load_workbook, Cell, MergedRegion, SheetGrid};

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::matcher::{split_instructors, DirectoryIndex, MatchResult};
use crate::model::{weekday_name, ClassInfo, ScheduleEntry, ScheduleSection};

static LEVEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(II|I)\s+stopnia").unwrap());
static YEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\brok\s*(\d+)").unwrap());
static SEMESTER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsemestr\s*(\d+)").unwrap());

/// Fixed row and column offsets of a timetable worksheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Row holding the section title (program, level, year, semester, mode)
    pub title_row: usize,
    /// Row holding the time range of each slot
    pub slot_row: usize,
    /// Row holding the group label of each column
    pub group_row: usize,
    /// First row with a calendar day
    pub first_data_row: usize,
    pub date_col: usize,
    pub weekday_col: usize,
    /// First column belonging to a time slot
    pub first_slot_col: usize,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            title_row: 0,
            slot_row: 1,
            group_row: 2,
            first_data_row: 3,
            date_col: 0,
            weekday_col: 1,
            first_slot_col: 2,
        }
    }
}

/// Inputs that influence parsing besides the workbook bytes.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    pub layout: &'a SheetLayout,
    /// Directory used to report instructor and subject names it doesn't know
    pub directory: Option<&'a DirectoryIndex>,
}

/// Counters and leftovers collected while parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub total_entries: usize,
    pub sheets_parsed: usize,
    pub sheets_skipped: usize,
    /// Entries whose natural key repeats an earlier entry in the same snapshot
    pub duplicate_keys: usize,
    pub unmatched_instructors: Vec<String>,
    pub unmatched_subjects: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub sections: Vec<ScheduleSection>,
    pub stats: ParseStats,
}

/// Parses workbook bytes into schedule sections.
///
/// The result only depends on `bytes` and `options`; the snapshot timestamp
/// and fingerprint are attached by the caller.
pub fn parse_workbook(bytes: &[u8], options: ParseOptions<'_>) -> Result<ParseOutcome, ParseError> {
    let grids = load_workbook(bytes)?;
    if grids.is_empty() {
        return Err(ParseError::NoSheets);
    }
    parse_grids(&grids, options)
}

/// Parses already loaded worksheets.
pub fn parse_grids(grids: &[SheetGrid], options: ParseOptions<'_>) -> Result<ParseOutcome, ParseError> {
    let mut stats = ParseStats::default();
    let mut sections = Vec::new();

    for (index, grid) in grids.iter().enumerate() {
        match parse_sheet(grid, index, options.layout) {
            Some(section) => {
                debug!(
                    sheet = %grid.name,
                    entries = section.entries.len(),
                    groups = section.groups.len(),
                    "Parsed worksheet"
                );
                stats.sheets_parsed += 1;
                sections.push(section);
            }
            None => {
                debug!(sheet = %grid.name, "Worksheet has no timetable layout, skipping");
                stats.sheets_skipped += 1;
            }
        }
    }

    if sections.is_empty() {
        return Err(ParseError::NoSchedule { sheets: grids.len() });
    }

    let mut seen = HashSet::new();
    for entry in sections.iter().flat_map(|s| s.entries.iter()) {
        let key = entry.natural_key();
        if !seen.insert(key.clone()) {
            warn!(key = %key, entry_id = %entry.id, "Duplicate natural key in timetable");
            stats.duplicate_keys += 1;
        }
    }

    stats.total_entries = sections.iter().map(|s| s.entries.len()).sum();
    if let Some(directory) = options.directory {
        let (instructors, subjects) = unmatched_names(&sections, directory);
        stats.unmatched_instructors = instructors;
        stats.unmatched_subjects = subjects;
    }

    info!(
        entries = stats.total_entries,
        sheets = stats.sheets_parsed,
        skipped = stats.sheets_skipped,
        duplicates = stats.duplicate_keys,
        "Parsed timetable workbook"
    );

    Ok(ParseOutcome { sections, stats })
}

/// A column that belongs to a time slot and a student group.
struct SlotColumn {
    col: usize,
    slot: TimeRange,
    group: String,
}

fn slot_columns(grid: &SheetGrid, layout: &SheetLayout) -> Vec<SlotColumn> {
    let mut columns = Vec::new();
    let mut current_slot: Option<TimeRange> = None;

    for col in layout.first_slot_col..grid.width() {
        if let Some(header) = grid.get(layout.slot_row, col).text() {
            current_slot = TimeRange::find(&header).map(|(range, _)| range);
        }
        let Some(slot) = &current_slot else {
            continue;
        };
        if let Some(group) = grid.visible(layout.group_row, col).text() {
            columns.push(SlotColumn {
                col,
                slot: slot.clone(),
                group,
            });
        }
    }

    columns
}

fn parse_sheet(grid: &SheetGrid, sheet_index: usize, layout: &SheetLayout) -> Option<ScheduleSection> {
    let columns = slot_columns(grid, layout);
    if columns.is_empty() {
        return None;
    }

    let mut groups: Vec<String> = Vec::new();
    for c in &columns {
        if !groups.contains(&c.group) {
            groups.push(c.group.clone());
        }
    }

    let meta = SectionMeta::parse(
        grid.get(layout.title_row, 0).text().as_deref(),
        &grid.name,
    );

    let mut entries = Vec::new();
    let mut current_date: Option<NaiveDate> = None;

    for row in layout.first_data_row..grid.height() {
        let date_cell = grid.get(row, layout.date_col);
        if !date_cell.is_empty() {
            match parse_date(date_cell) {
                Some(date) => current_date = Some(date),
                None => {
                    debug!(sheet = %grid.name, row, "Row without a readable date, skipping");
                    continue;
                }
            }
        }
        let Some(date) = current_date else {
            continue;
        };

        let day_of_week = grid
            .get(row, layout.weekday_col)
            .text()
            .map(|d| d.to_lowercase())
            .unwrap_or_else(|| weekday_name(date.weekday()).to_string());

        for column in &columns {
            let Some(text) = grid.visible(row, column.col).text() else {
                continue;
            };
            let Some(parsed) = decompose(&text) else {
                continue;
            };

            let time = parsed.time_override.unwrap_or_else(|| column.slot.clone());
            entries.push(ScheduleEntry {
                id: format!("{}-{}-{}", sheet_index, row, column.col),
                date,
                day_of_week: day_of_week.clone(),
                start_time: time.start,
                end_time: time.end,
                group: column.group.clone(),
                class_info: ClassInfo {
                    subject: parsed.subject,
                    class_type: parsed.class_type,
                    instructor: parsed.instructor,
                    room: parsed.room,
                    is_remote: parsed.is_remote,
                    note: parsed.note,
                },
            });
        }
    }

    Some(ScheduleSection {
        program: meta.program,
        degree_level: meta.degree_level,
        year: meta.year,
        semester: meta.semester,
        mode: meta.mode,
        groups,
        entries,
    })
}

/// Section attributes read from the title row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SectionMeta {
    program: String,
    degree_level: Option<String>,
    year: Option<u32>,
    semester: Option<u32>,
    mode: Option<String>,
}

impl SectionMeta {
    /// Parses titles like `Informatyka, studia I stopnia, rok 2, semestr 3, stacjonarne`.
    fn parse(title: Option<&str>, sheet_name: &str) -> Self {
        let title = title.unwrap_or("");
        let program = title
            .split(',')
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(sheet_name.trim())
            .to_string();

        let lower = title.to_lowercase();
        let degree_level = if lower.contains("jednolite") {
            Some("jednolite".to_string())
        } else {
            LEVEL_REGEX
                .captures(title)
                .map(|caps| caps[1].to_uppercase())
        };
        let mode = if lower.contains("niestacjonarne") {
            Some("niestacjonarne".to_string())
        } else if lower.contains("stacjonarne") {
            Some("stacjonarne".to_string())
        } else if lower.contains("online") {
            Some("online".to_string())
        } else {
            None
        };

        Self {
            program,
            degree_level,
            year: capture_number(&YEAR_REGEX, title),
            semester: capture_number(&SEMESTER_REGEX, title),
            mode,
        }
    }
}

fn capture_number(regex: &Regex, text: &str) -> Option<u32> {
    regex.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Reads a date cell: an Excel serial number, `YYYY-MM-DD` or `DD.MM.YYYY`.
fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(serial) if *serial >= 1.0 => {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            epoch.checked_add_days(Days::new(serial.floor() as u64))
        }
        Cell::Text(text) => {
            let text = text.trim();
            // Some sheets append the time of day to the date
            let text = text
                .split(|c: char| c.is_whitespace() || c == 'T')
                .next()
                .unwrap_or(text);
            ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        }
        _ => None,
    }
}

/// Instructor and subject names absent from the directory, sorted and unique.
fn unmatched_names(
    sections: &[ScheduleSection],
    directory: &DirectoryIndex,
) -> (Vec<String>, Vec<String>) {
    let mut instructors = BTreeSet::new();
    let mut subjects = BTreeSet::new();

    for entry in sections.iter().flat_map(|s| s.entries.iter()) {
        let info = &entry.class_info;
        if !matches!(directory.match_subject(&info.subject), MatchResult::Matched(_)) {
            subjects.insert(info.subject.clone());
        }
        if let Some(instructor) = &info.instructor {
            for part in split_instructors(instructor) {
                if !matches!(directory.match_instructor(part), MatchResult::Matched(_)) {
                    instructors.insert(part.to_string());
                }
            }
        }
    }

    (instructors.into_iter().collect(), subjects.into_iter().collect())
}
