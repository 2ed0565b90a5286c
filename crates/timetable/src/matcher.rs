//! Reconciles free-text instructor and subject names from the timetable with
//! the canonical directory.
//!
//! Matching is a two-tier exact lookup: the full name first, then the alias
//! set, both compared case-insensitively after whitespace normalisation.
//! Nothing here writes to the directory; results are suggestions an admin has
//! to confirm.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::db::{CandidateIgnore, Instructor, Subject};
use crate::model::ParsedSchedule;

/// Splits a multi-instructor cell such as `JK / AB` into its parts.
pub fn split_instructors(field: &str) -> impl Iterator<Item = &str> {
    field.split('/').map(str::trim).filter(|s| !s.is_empty())
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Matched(i64),
    /// More than one record claims the name; never resolved automatically
    Ambiguous(Vec<i64>),
    Unmatched,
}

#[derive(Debug, Clone, Default)]
struct NameIndex {
    by_name: HashMap<String, Vec<i64>>,
    by_alias: HashMap<String, Vec<i64>>,
    names: HashMap<i64, String>,
}

impl NameIndex {
    fn insert(&mut self, id: i64, name: &str, aliases: &[String]) {
        self.names.insert(id, name.to_string());
        push_unique(self.by_name.entry(normalize(name)).or_default(), id);
        for alias in aliases {
            push_unique(self.by_alias.entry(normalize(alias)).or_default(), id);
        }
    }

    fn lookup(&self, value: &str) -> MatchResult {
        let key = normalize(value);
        if key.is_empty() {
            return MatchResult::Unmatched;
        }
        for tier in [&self.by_name, &self.by_alias] {
            match tier.get(&key).map(Vec::as_slice) {
                Some([id]) => return MatchResult::Matched(*id),
                Some(ids) if ids.len() > 1 => return MatchResult::Ambiguous(ids.to_vec()),
                _ => {}
            }
        }
        MatchResult::Unmatched
    }
}

fn push_unique(ids: &mut Vec<i64>, id: i64) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

/// Lookup tables over the instructor and subject directories.
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    instructors: NameIndex,
    subjects: NameIndex,
}

impl DirectoryIndex {
    pub fn new(instructors: &[Instructor], subjects: &[Subject]) -> Self {
        let mut index = Self::default();
        for i in instructors {
            index.instructors.insert(i.id, &i.name, &i.aliases);
        }
        for s in subjects {
            index.subjects.insert(s.id, &s.name, &s.aliases);
        }
        index
    }

    /// Builds an index from `(id, name, aliases)` tuples.
    pub fn from_names(instructors: &[(i64, &str, &[&str])], subjects: &[(i64, &str, &[&str])]) -> Self {
        let to_owned = |aliases: &[&str]| aliases.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        let mut index = Self::default();
        for (id, name, aliases) in instructors {
            index.instructors.insert(*id, name, &to_owned(aliases));
        }
        for (id, name, aliases) in subjects {
            index.subjects.insert(*id, name, &to_owned(aliases));
        }
        index
    }

    pub fn match_instructor(&self, value: &str) -> MatchResult {
        self.instructors.lookup(value)
    }

    pub fn match_subject(&self, value: &str) -> MatchResult {
        self.subjects.lookup(value)
    }

    pub fn instructor_name(&self, id: i64) -> Option<&str> {
        self.instructors.names.get(&id).map(String::as_str)
    }

    pub fn subject_name(&self, id: i64) -> Option<&str> {
        self.subjects.names.get(&id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Instructor,
    Subject,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Instructor => "instructor",
            CandidateKind::Subject => "subject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instructor" => Some(CandidateKind::Instructor),
            "subject" => Some(CandidateKind::Subject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateReason {
    Unmatched,
    Ambiguous,
}

/// A timetable name the directory can't resolve to exactly one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub kind: CandidateKind,
    pub value: String,
    /// Subject for instructor candidates, program for subject candidates
    pub context: String,
    pub occurrences: usize,
    pub reason: CandidateReason,
    /// Conflicting record ids for ambiguous names
    pub matches: Vec<i64>,
}

fn is_ignored(ignores: &[CandidateIgnore], kind: CandidateKind, value: &str, context: &str) -> bool {
    let value = normalize(value);
    let context = normalize(context);
    ignores.iter().any(|ig| {
        ig.kind == kind
            && normalize(&ig.value) == value
            && (ig.context.trim().is_empty() || normalize(&ig.context) == context)
    })
}

fn collect_candidates(
    kind: CandidateKind,
    observed: BTreeMap<(String, String), usize>,
    lookup: impl Fn(&str) -> MatchResult,
    ignores: &[CandidateIgnore],
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = observed
        .into_iter()
        .filter(|((value, context), _)| !is_ignored(ignores, kind, value, context))
        .filter_map(|((value, context), occurrences)| {
            let (reason, matches) = match lookup(&value) {
                MatchResult::Matched(_) => return None,
                MatchResult::Ambiguous(ids) => (CandidateReason::Ambiguous, ids),
                MatchResult::Unmatched => (CandidateReason::Unmatched, Vec::new()),
            };
            Some(Candidate {
                kind,
                value,
                context,
                occurrences,
                reason,
                matches,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.value.cmp(&b.value))
            .then_with(|| a.context.cmp(&b.context))
    });
    candidates
}

/// Instructor names (split on `/`) that match no directory record or more
/// than one, keyed by the subject they teach.
pub fn detect_instructor_candidates(
    schedule: &ParsedSchedule,
    index: &DirectoryIndex,
    ignores: &[CandidateIgnore],
) -> Vec<Candidate> {
    let mut observed = BTreeMap::new();
    for entry in schedule.entries() {
        let Some(field) = &entry.class_info.instructor else {
            continue;
        };
        for part in split_instructors(field) {
            *observed
                .entry((part.to_string(), entry.class_info.subject.clone()))
                .or_insert(0) += 1;
        }
    }
    collect_candidates(
        CandidateKind::Instructor,
        observed,
        |v| index.match_instructor(v),
        ignores,
    )
}

/// Subject names that match no directory record or more than one, keyed by
/// program.
pub fn detect_subject_candidates(
    schedule: &ParsedSchedule,
    index: &DirectoryIndex,
    ignores: &[CandidateIgnore],
) -> Vec<Candidate> {
    let mut observed = BTreeMap::new();
    for section in &schedule.sections {
        for entry in &section.entries {
            *observed
                .entry((entry.class_info.subject.clone(), section.program.clone()))
                .or_insert(0) += 1;
        }
    }
    collect_candidates(
        CandidateKind::Subject,
        observed,
        |v| index.match_subject(v),
        ignores,
    )
}

/// A resolved (subject, instructor) pair seen in the timetable but missing
/// from the relation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCandidate {
    pub subject_id: i64,
    pub subject: String,
    pub instructor_id: i64,
    pub instructor: String,
    pub occurrences: usize,
}

pub fn detect_missing_links(
    schedule: &ParsedSchedule,
    index: &DirectoryIndex,
    existing: &HashSet<(i64, i64)>,
) -> Vec<LinkCandidate> {
    let mut observed: BTreeMap<(i64, i64), usize> = BTreeMap::new();
    for entry in schedule.entries() {
        let MatchResult::Matched(subject_id) = index.match_subject(&entry.class_info.subject) else {
            continue;
        };
        let Some(field) = &entry.class_info.instructor else {
            continue;
        };
        for part in split_instructors(field) {
            if let MatchResult::Matched(instructor_id) = index.match_instructor(part) {
                if !existing.contains(&(subject_id, instructor_id)) {
                    *observed.entry((subject_id, instructor_id)).or_insert(0) += 1;
                }
            }
        }
    }

    let mut links: Vec<LinkCandidate> = observed
        .into_iter()
        .map(|((subject_id, instructor_id), occurrences)| LinkCandidate {
            subject_id,
            subject: index.subject_name(subject_id).unwrap_or_default().to_string(),
            instructor_id,
            instructor: index.instructor_name(instructor_id).unwrap_or_default().to_string(),
            occurrences,
        })
        .collect();
    links.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    links
}

/// A subject the given instructor appears to teach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkProposal {
    pub subject: String,
    /// Directory record of the subject, if it resolves to exactly one
    pub subject_id: Option<i64>,
    pub occurrences: usize,
    pub already_linked: bool,
}

/// Scans the timetable for classes taught by `instructor`, matching each
/// `/`-separated part of the instructor cell against the full name and the
/// aliases. Proposals are deduplicated by subject.
pub fn propose_links(
    schedule: &ParsedSchedule,
    instructor: &Instructor,
    index: &DirectoryIndex,
    existing: &HashSet<(i64, i64)>,
) -> Vec<LinkProposal> {
    let mut names: HashSet<String> = instructor.aliases.iter().map(|a| normalize(a)).collect();
    names.insert(normalize(&instructor.name));
    names.remove("");

    // normalized subject -> (first spelling, count)
    let mut subjects: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for entry in schedule.entries() {
        let Some(field) = &entry.class_info.instructor else {
            continue;
        };
        if split_instructors(field).any(|part| names.contains(&normalize(part))) {
            let subject = &entry.class_info.subject;
            subjects
                .entry(normalize(subject))
                .or_insert_with(|| (subject.clone(), 0))
                .1 += 1;
        }
    }

    let mut proposals: Vec<LinkProposal> = subjects
        .into_values()
        .map(|(subject, occurrences)| {
            let subject_id = match index.match_subject(&subject) {
                MatchResult::Matched(id) => Some(id),
                _ => None,
            };
            LinkProposal {
                already_linked: subject_id
                    .map(|id| existing.contains(&(id, instructor.id)))
                    .unwrap_or(false),
                subject,
                subject_id,
                occurrences,
            }
        })
        .collect();
    proposals.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.subject.cmp(&b.subject))
    });
    proposals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassInfo, ScheduleEntry, ScheduleSection};
    use chrono::{NaiveDate, Utc};

    fn entry(day: u32, group: &str, subject: &str, instructor: &str) -> ScheduleEntry {
        ScheduleEntry {
            id: format!("0-{}-{}", day, group),
            date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
            day_of_week: "sobota".to_string(),
            start_time: "08:00".to_string(),
            end_time: "09:30".to_string(),
            group: group.to_string(),
            class_info: ClassInfo {
                subject: subject.to_string(),
                class_type: None,
                instructor: Some(instructor.to_string()),
                room: Some("101".to_string()),
                is_remote: false,
                note: None,
            },
        }
    }

    fn schedule(entries: Vec<ScheduleEntry>) -> ParsedSchedule {
        ParsedSchedule {
            sections: vec![ScheduleSection {
                program: "Informatyka".to_string(),
                degree_level: Some("I".to_string()),
                year: Some(1),
                semester: Some(1),
                mode: Some("stacjonarne".to_string()),
                groups: vec!["DS1".to_string()],
                entries,
            }],
            last_updated: Utc::now(),
            file_hash: "hash".to_string(),
            file_name: None,
        }
    }

    fn kowalski() -> Instructor {
        Instructor {
            id: 1,
            name: "Jan Kowalski".to_string(),
            aliases: vec!["JK".to_string()],
        }
    }

    #[test]
    fn test_two_tier_lookup() {
        let index = DirectoryIndex::from_names(
            &[(1, "Jan Kowalski", &["JK"]), (2, "Józef Kania", &["JK2"])],
            &[],
        );

        assert_eq!(index.match_instructor("  jan   KOWALSKI "), MatchResult::Matched(1));
        assert_eq!(index.match_instructor("jk"), MatchResult::Matched(1));
        assert_eq!(index.match_instructor("J. Kowalski"), MatchResult::Unmatched);
        assert_eq!(index.match_instructor(""), MatchResult::Unmatched);
    }

    #[test]
    fn test_full_name_wins_over_alias() {
        let index = DirectoryIndex::from_names(
            &[(1, "Nowak", &[]), (2, "Adam Nowak", &["Nowak"])],
            &[],
        );
        assert_eq!(index.match_instructor("Nowak"), MatchResult::Matched(1));
    }

    #[test]
    fn test_shared_alias_is_ambiguous() {
        let index = DirectoryIndex::from_names(
            &[(1, "Jan Kowalski", &["JK"]), (2, "Julia Krawczyk", &["JK"])],
            &[],
        );
        assert_eq!(index.match_instructor("JK"), MatchResult::Ambiguous(vec![1, 2]));
    }

    #[test]
    fn test_split_part_matches_and_other_part_is_candidate() {
        let index = DirectoryIndex::new(&[kowalski()], &[]);
        let schedule = schedule(vec![entry(5, "DS1", "Matematyka", "JK / AB")]);

        let candidates = detect_instructor_candidates(&schedule, &index, &[]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "AB");
        assert_eq!(candidates[0].context, "Matematyka");
        assert_eq!(candidates[0].reason, CandidateReason::Unmatched);

        let proposals = propose_links(&schedule, &kowalski(), &index, &HashSet::new());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].subject, "Matematyka");
    }

    #[test]
    fn test_ignored_candidates_are_excluded() {
        let index = DirectoryIndex::default();
        let schedule = schedule(vec![
            entry(5, "DS1", "Matematyka", "AB"),
            entry(6, "DS1", "Fizyka", "AB"),
            entry(6, "DS2", "Fizyka", "CD"),
        ]);
        let ignores = vec![
            CandidateIgnore {
                id: 1,
                kind: CandidateKind::Instructor,
                value: "ab".to_string(),
                context: "Matematyka".to_string(),
                reason: None,
            },
            CandidateIgnore {
                id: 2,
                kind: CandidateKind::Instructor,
                value: "CD".to_string(),
                context: String::new(),
                reason: Some("not a person".to_string()),
            },
        ];

        let candidates = detect_instructor_candidates(&schedule, &index, &ignores);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "AB");
        assert_eq!(candidates[0].context, "Fizyka");
    }

    #[test]
    fn test_subject_candidates_use_program_context() {
        let index = DirectoryIndex::from_names(&[], &[(1, "Matematyka", &["Mat."])]);
        let schedule = schedule(vec![
            entry(5, "DS1", "Mat.", "JK"),
            entry(5, "DS2", "Fizyka", "JK"),
            entry(6, "DS2", "Fizyka", "JK"),
        ]);

        let candidates = detect_subject_candidates(&schedule, &index, &[]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "Fizyka");
        assert_eq!(candidates[0].context, "Informatyka");
        assert_eq!(candidates[0].occurrences, 2);
    }

    #[test]
    fn test_proposals_are_deduplicated_and_annotated() {
        let index = DirectoryIndex::new(
            &[kowalski()],
            &[
                Subject {
                    id: 10,
                    name: "Matematyka".to_string(),
                    aliases: vec![],
                },
                Subject {
                    id: 11,
                    name: "Fizyka".to_string(),
                    aliases: vec![],
                },
            ],
        );
        let schedule = schedule(vec![
            entry(5, "DS1", "Matematyka", "JK"),
            entry(6, "DS1", "Matematyka", "Jan Kowalski / AB"),
            entry(7, "DS1", "Fizyka", "jk"),
            entry(8, "DS1", "Chemia", "AB"),
        ]);
        let existing = HashSet::from([(11, 1)]);

        let proposals = propose_links(&schedule, &kowalski(), &index, &existing);
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].subject, "Matematyka");
        assert_eq!(proposals[0].occurrences, 2);
        assert_eq!(proposals[0].subject_id, Some(10));
        assert!(!proposals[0].already_linked);
        assert_eq!(proposals[1].subject, "Fizyka");
        assert!(proposals[1].already_linked);

        let missing = detect_missing_links(&schedule, &index, &existing);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].subject_id, 10);
        assert_eq!(missing[0].instructor_id, 1);
        assert_eq!(missing[0].occurrences, 2);
    }
}
