//! Deduplicated, append-only attendance record for one session.
//!
//! Entries are set-once by student ID (first detection wins); there is no
//! update or delete within a session. The per-cohort summary is derived by
//! recounting the entry set on every acceptance so the roll and the summary
//! can never drift apart.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Accepted intake/course sets for the active session, compared
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    intakes: HashSet<String>,
    courses: HashSet<String>,
}

impl EligibilityFilter {
    pub fn new<I, C>(intakes: I, courses: C) -> Self
    where
        I: IntoIterator<Item = String>,
        C: IntoIterator<Item = String>,
    {
        Self {
            intakes: intakes.into_iter().map(|s| s.trim().to_lowercase()).collect(),
            courses: courses.into_iter().map(|s| s.trim().to_lowercase()).collect(),
        }
    }

    pub fn is_eligible(&self, intake: &str, course: &str) -> bool {
        self.intakes.contains(&intake.trim().to_lowercase())
            && self.courses.contains(&course.trim().to_lowercase())
    }
}

/// One accepted attendance record. Never mutated after creation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttendanceEntry {
    pub student_id: String,
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub intake_course_key: String,
}

/// Outcome of an attendance recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// New entry added.
    Accepted,
    /// Student already recorded; first-seen time preserved.
    Duplicate,
    /// Intake or course outside the session filter. Expected, not an error.
    Ineligible,
}

pub struct AttendanceLedger {
    filter: EligibilityFilter,
    entries: Vec<AttendanceEntry>,
    seen: HashSet<String>,
    summary: HashMap<String, usize>,
}

impl AttendanceLedger {
    pub fn new(filter: EligibilityFilter) -> Self {
        Self {
            filter,
            entries: Vec::new(),
            seen: HashSet::new(),
            summary: HashMap::new(),
        }
    }

    /// Record a recognized student if the cohort passes the session filter.
    ///
    /// Idempotent by student ID: a second call for the same student is a
    /// no-op returning [`RecordOutcome::Duplicate`]. The similarity gate
    /// must already have been applied upstream; below-gate detections
    /// never reach the ledger.
    pub fn record_if_eligible(
        &mut self,
        student_id: &str,
        name: &str,
        intake: &str,
        course: &str,
        seen_at: DateTime<Utc>,
    ) -> RecordOutcome {
        if !self.filter.is_eligible(intake, course) {
            tracing::debug!(student_id, intake, course, "detection outside session filter");
            return RecordOutcome::Ineligible;
        }
        if !self.seen.insert(student_id.to_string()) {
            return RecordOutcome::Duplicate;
        }

        let key = format!("{} {}", intake.trim(), course.trim());
        self.entries.push(AttendanceEntry {
            student_id: student_id.to_string(),
            name: name.to_string(),
            first_seen: seen_at,
            intake_course_key: key,
        });
        self.recompute_summary();

        tracing::info!(student_id, name, "attendance recorded");
        RecordOutcome::Accepted
    }

    /// Rebuild the per-cohort counts from the entry set. The count for a
    /// key always equals the number of entries carrying that key.
    fn recompute_summary(&mut self) {
        self.summary.clear();
        for entry in &self.entries {
            *self.summary.entry(entry.intake_course_key.clone()).or_insert(0) += 1;
        }
    }

    /// Chronological attendance roll.
    pub fn roll(&self) -> &[AttendanceEntry] {
        &self.entries
    }

    /// Derived cohort-key → present-count mapping.
    pub fn summary(&self) -> &HashMap<String, usize> {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> EligibilityFilter {
        EligibilityFilter::new(
            vec!["Intake 40".to_string()],
            vec!["Computer Science".to_string()],
        )
    }

    #[test]
    fn test_record_accepted() {
        let mut ledger = AttendanceLedger::new(filter());
        let out = ledger.record_if_eligible("S2001", "John", "Intake 40", "Computer Science", Utc::now());
        assert_eq!(out, RecordOutcome::Accepted);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.summary()["Intake 40 Computer Science"], 1);
    }

    #[test]
    fn test_dedup_idempotent() {
        let mut ledger = AttendanceLedger::new(filter());
        let t0 = Utc::now();
        ledger.record_if_eligible("S2001", "John", "Intake 40", "Computer Science", t0);
        let out = ledger.record_if_eligible(
            "S2001",
            "John",
            "Intake 40",
            "Computer Science",
            t0 + chrono::Duration::seconds(10),
        );
        assert_eq!(out, RecordOutcome::Duplicate);
        assert_eq!(ledger.len(), 1);
        // First-seen time preserved.
        assert_eq!(ledger.roll()[0].first_seen, t0);
        // Derived count still equals the entry count for that key.
        assert_eq!(ledger.summary()["Intake 40 Computer Science"], 1);
    }

    #[test]
    fn test_ineligible_excluded() {
        let mut ledger = AttendanceLedger::new(filter());
        let out = ledger.record_if_eligible("S9", "Eve", "Intake 39", "Computer Science", Utc::now());
        assert_eq!(out, RecordOutcome::Ineligible);
        let out = ledger.record_if_eligible("S9", "Eve", "Intake 40", "Data Science", Utc::now());
        assert_eq!(out, RecordOutcome::Ineligible);
        assert!(ledger.is_empty());
        assert!(ledger.summary().is_empty());
    }

    #[test]
    fn test_eligibility_case_insensitive() {
        let mut ledger = AttendanceLedger::new(filter());
        let out = ledger.record_if_eligible("S1", "Ana", "intake 40", "COMPUTER SCIENCE", Utc::now());
        assert_eq!(out, RecordOutcome::Accepted);
        // Key keeps the event's casing.
        assert_eq!(ledger.roll()[0].intake_course_key, "intake 40 COMPUTER SCIENCE");
    }

    #[test]
    fn test_roll_is_chronological() {
        let mut ledger = AttendanceLedger::new(EligibilityFilter::new(
            vec!["Intake 40".to_string(), "Intake 41".to_string()],
            vec!["Computer Science".to_string()],
        ));
        let t0 = Utc::now();
        ledger.record_if_eligible("S1", "A", "Intake 40", "Computer Science", t0);
        ledger.record_if_eligible("S2", "B", "Intake 41", "Computer Science", t0);
        ledger.record_if_eligible("S3", "C", "Intake 40", "Computer Science", t0);
        let ids: Vec<_> = ledger.roll().iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(ids, ["S1", "S2", "S3"]);
        assert_eq!(ledger.summary()["Intake 40 Computer Science"], 2);
        assert_eq!(ledger.summary()["Intake 41 Computer Science"], 1);
    }
}
