//! Decomposition of a single timetable cell into class details.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::ClassType;

static TIME_RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})[:.](\d{2})\s*[-–—]\s*(\d{1,2})[:.](\d{2})").unwrap()
});
static TRAILING_PAREN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\(([^()]*)\)\s*$").unwrap());
static ROOM_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:s\.\s*|(?:sala|room|aula)\s+)(\S.*)$").unwrap());
/// Digits with at most a one-letter building prefix: `101`, `C2.14`, `A-12`.
static ROOM_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][-.]?)?\d{1,4}[A-Za-z]?(?:\.\d{1,3}[A-Za-z]?)?$").unwrap()
});
/// Codes with a longer letter prefix, e.g. `WZ-101`. These look like initials
/// with a number, so they only count as rooms once the instructor is known.
static LETTERED_ROOM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}[-.]?\d{1,4}[A-Za-z]?(?:\.\d{1,3}[A-Za-z]?)?$").unwrap()
});

const REMOTE_MARKERS: &[&str] = &["zdalnie", "online", "on-line", "e-learning"];

/// `HH:MM` start and end of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    /// Finds the first time range in `text`, e.g. `8.00 - 9.30` or `13:45-16:15`.
    pub fn find(text: &str) -> Option<(Self, std::ops::Range<usize>)> {
        TIME_RANGE_REGEX.captures_iter(text).find_map(|caps| {
            let span = caps.get(0)?.range();
            let start = format_time(&caps[1], &caps[2])?;
            let end = format_time(&caps[3], &caps[4])?;
            Some((TimeRange { start, end }, span))
        })
    }
}

fn format_time(hour: &str, minute: &str) -> Option<String> {
    let h: u32 = hour.parse().ok()?;
    let m: u32 = minute.parse().ok()?;
    (h < 24 && m < 60).then(|| format!("{:02}:{:02}", h, m))
}

/// Class details read from one cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCell {
    pub subject: String,
    pub class_type: Option<ClassType>,
    pub instructor: Option<String>,
    pub room: Option<String>,
    pub is_remote: bool,
    pub note: Option<String>,
    /// Explicit time written in the cell, overriding the slot header
    pub time_override: Option<TimeRange>,
}

/// Splits cell text into subject, type, instructor, room and note.
///
/// Returns `None` when the cell holds no subject, which means there is no
/// class in this slot.
pub fn decompose(text: &str) -> Option<ParsedCell> {
    let mut text = text.replace('\r', "");
    let time_override = TimeRange::find(&text).map(|(range, span)| {
        text.replace_range(span, "");
        range
    });

    let mut lines: Vec<String> = text
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() == 1 && lines[0].contains(',') {
        lines = lines[0]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    let mut lines = lines.into_iter();
    let (subject, mut class_type) = split_subject(&lines.next()?);
    if !subject.chars().any(|c| c.is_alphanumeric()) {
        return None;
    }

    let mut cell = ParsedCell {
        subject,
        time_override,
        ..Default::default()
    };
    let mut note_parts = Vec::new();

    for line in lines {
        if class_type.is_none() {
            if let Some(t) = ClassType::from_keyword(&line) {
                class_type = Some(t);
                continue;
            }
        }
        if is_remote_marker(&line) {
            cell.is_remote = true;
            continue;
        }
        if cell.room.is_none() {
            if let Some(room) = parse_room(&line, cell.instructor.is_some()) {
                cell.room = Some(room);
                continue;
            }
        }
        if cell.instructor.is_none() {
            cell.instructor = Some(line);
            continue;
        }
        note_parts.push(line);
    }

    cell.class_type = class_type;
    if cell.is_remote {
        cell.room = None;
    }
    if !note_parts.is_empty() {
        cell.note = Some(note_parts.join(" "));
    }
    Some(cell)
}

/// Strips a class type written after the subject, as in `Fizyka (wykład)`
/// or `Fizyka lab`.
fn split_subject(line: &str) -> (String, Option<ClassType>) {
    if let Some(caps) = TRAILING_PAREN_REGEX.captures(line) {
        if let Some(t) = ClassType::from_keyword(&caps[2]) {
            return (caps[1].trim().to_string(), Some(t));
        }
    }

    if let Some((head, last)) = line.rsplit_once(char::is_whitespace) {
        if let Some(t) = ClassType::from_keyword(last) {
            if !head.trim().is_empty() {
                return (head.trim().to_string(), Some(t));
            }
        }
    }

    (line.trim().to_string(), None)
}

fn is_remote_marker(line: &str) -> bool {
    let lower = line.to_lowercase();
    REMOTE_MARKERS.iter().any(|m| lower == *m) || lower.contains("zdalnie")
}

fn parse_room(line: &str, has_instructor: bool) -> Option<String> {
    if let Some(caps) = ROOM_PREFIX_REGEX.captures(line) {
        return Some(caps[1].trim().to_string());
    }
    let is_room = ROOM_CODE_REGEX.is_match(line)
        || (has_instructor && LETTERED_ROOM_REGEX.is_match(line));
    is_room.then(|| line.to_string())
}
