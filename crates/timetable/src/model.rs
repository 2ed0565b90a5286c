//! Schedule snapshot types shared by the parser, the store and the API.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw spreadsheet as downloaded from the institution's site.
#[derive(Debug, Clone)]
pub struct RawSpreadsheet {
    pub buffer: Vec<u8>,
    pub filename: String,
    pub url: String,
}

/// Kind of class, read from a fixed keyword vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassType {
    #[serde(rename = "wykład")]
    Lecture,
    #[serde(rename = "laboratorium")]
    Lab,
    #[serde(rename = "projekt")]
    Project,
    #[serde(rename = "ćwiczenia")]
    Exercise,
}

impl ClassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassType::Lecture => "wykład",
            ClassType::Lab => "laboratorium",
            ClassType::Project => "projekt",
            ClassType::Exercise => "ćwiczenia",
        }
    }

    /// Matches a keyword or its abbreviation, ignoring case and a trailing dot.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let word = word.trim().trim_end_matches('.').to_lowercase();
        match word.as_str() {
            "wykład" | "wyklad" | "wyk" => Some(ClassType::Lecture),
            "laboratorium" | "laboratoria" | "lab" => Some(ClassType::Lab),
            "projekt" | "proj" => Some(ClassType::Project),
            "ćwiczenia" | "cwiczenia" | "ćw" | "cw" => Some(ClassType::Exercise),
            _ => None,
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is taught in a slot and by whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub subject: String,
    pub class_type: Option<ClassType>,
    pub instructor: Option<String>,
    pub room: Option<String>,
    pub is_remote: bool,
    pub note: Option<String>,
}

/// One timetabled class occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub date: NaiveDate,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub group: String,
    pub class_info: ClassInfo,
}

impl ScheduleEntry {
    /// Time range as `HH:MM-HH:MM`.
    pub fn time_range(&self) -> String {
        format!("{}-{}", self.start_time, self.end_time)
    }

    /// Identity of this class across snapshots. Entry ids are regenerated on
    /// every parse, so the diff correlates entries by this key only.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            date: self.date,
            time: self.time_range(),
            group: self.group.clone(),
            subject: self.class_info.subject.clone(),
        }
    }
}

/// `(date, time, group, subject)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub date: NaiveDate,
    pub time: String,
    pub group: String,
    pub subject: String,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.date, self.time, self.group, self.subject)
    }
}

/// Entries sharing program, level, year, semester and mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSection {
    pub program: String,
    pub degree_level: Option<String>,
    pub year: Option<u32>,
    pub semester: Option<u32>,
    pub mode: Option<String>,
    pub groups: Vec<String>,
    pub entries: Vec<ScheduleEntry>,
}

/// A full parsed timetable as of one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSchedule {
    pub sections: Vec<ScheduleSection>,
    pub last_updated: DateTime<Utc>,
    pub file_hash: String,
    pub file_name: Option<String>,
}

impl ParsedSchedule {
    pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(ChangeType::Added),
            "removed" => Some(ChangeType::Removed),
            "modified" => Some(ChangeType::Modified),
            _ => None,
        }
    }
}

/// One difference between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleChange {
    pub id: i64,
    pub old_schedule_id: Option<i64>,
    pub new_schedule_id: i64,
    pub change_type: ChangeType,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub group: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

/// Polish weekday name, as printed in the timetable.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "poniedziałek",
        Weekday::Tue => "wtorek",
        Weekday::Wed => "środa",
        Weekday::Thu => "czwartek",
        Weekday::Fri => "piątek",
        Weekday::Sat => "sobota",
        Weekday::Sun => "niedziela",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_type_keywords() {
        assert_eq!(ClassType::from_keyword("Wykład"), Some(ClassType::Lecture));
        assert_eq!(ClassType::from_keyword("ćw."), Some(ClassType::Exercise));
        assert_eq!(ClassType::from_keyword("LAB"), Some(ClassType::Lab));
        assert_eq!(ClassType::from_keyword("proj."), Some(ClassType::Project));
        assert_eq!(ClassType::from_keyword("JK"), None);
    }

    #[test]
    fn test_class_type_serializes_as_keyword() {
        let json = serde_json::to_string(&ClassType::Lecture).unwrap();
        assert_eq!(json, "\"wykład\"");
    }
}
