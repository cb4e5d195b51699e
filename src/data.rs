use serde::{Deserialize, Serialize};
use std::fmt;

// Type aliases for clarity
pub type DayOfWeek = u8;
pub type Session = u8;
pub type Hours = u32;
pub type SemesterKey = String;

/// Number of teaching weeks in a semester.
pub const SEMESTER_WEEKS: usize = 18;

/// Start period reserved for occurrences that never need a physical room.
pub const NO_ROOM_START_PERIOD: u32 = 12;

/// Longest single occurrence accepted on import, in periods.
pub const MAX_PERIOD_LENGTH: u32 = 16;

/// One predefined weekly time slot of a semester's template pool.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRow {
    pub total_periods_category: Hours,
    pub day_of_week: DayOfWeek,
    pub session: Session,
    pub start_period: u32,
    pub period_length: u32,
    pub week_active: Vec<bool>,
    pub row_id: String,
    #[serde(default)]
    pub database_id: Option<i64>,
}

impl TemplateRow {
    pub fn active_weeks(&self) -> u32 {
        self.week_active.iter().filter(|w| **w).count() as u32
    }

    /// Class-hours one occurrence of this row delivers over the semester.
    pub fn usable_hours(&self) -> i64 {
        i64::from(self.period_length) * i64::from(self.active_weeks())
    }

    pub fn needs_room(&self) -> bool {
        self.start_period != NO_ROOM_START_PERIOD
    }
}

/// A physical room from the catalog. Never mutated by the engine.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
    pub capacity: u32,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub note: String,
}

/// One subject to be scheduled within a batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScheduleRequest {
    pub subject_code: String,
    #[serde(default)]
    pub subject_name: String,
    pub total_hours: Hours,
    pub classes: u32,
    pub students_per_class: u32,
    #[serde(default)]
    pub cohort_year: String,
    #[serde(default)]
    pub special_program: String,
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub subject_type: String,
}

/// Identifies the per-user scheduling scope.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct UserScope {
    pub user_id: String,
    pub academic_year: String,
    pub semester: String,
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.academic_year, self.semester)
    }
}

/// The complete input for one generation call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub semester: SemesterKey,
    pub subjects: Vec<SubjectScheduleRequest>,
    #[serde(default)]
    pub scope: Option<UserScope>,
}

/// A single concrete weekly occurrence of a class-section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub class_number: u32,
    pub day_of_week: DayOfWeek,
    pub session: Session,
    pub start_period: u32,
    pub period_length: u32,
    pub room_code: Option<String>,
    pub building: Option<String>,
    pub hours_before: i64,
    pub hours_after: i64,
    pub week_active: Vec<bool>,
    pub template_row_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub total_hours: Hours,
    pub students_per_class: u32,
    pub cohort_year: String,
    pub special_program: String,
    pub major: String,
    pub subject_type: String,
}

/// Outcome for one subject of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_code: String,
    pub subject_name: String,
    pub classes_placed: u32,
    pub rows: Vec<ScheduleRow>,
    pub note: Option<String>,
}

/// The final output of a generation call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    pub message: Option<String>,
    pub subjects: Vec<SubjectResult>,
    pub total_rows: usize,
    pub total_classes: u32,
    pub session_cursor: i32,
    pub rooms_reserved: usize,
}

impl BatchResult {
    pub fn no_data(message: String, cursor: i32) -> Self {
        Self {
            success: false,
            message: Some(message),
            subjects: Vec::new(),
            total_rows: 0,
            total_classes: 0,
            session_cursor: cursor,
            rooms_reserved: 0,
        }
    }
}

/// Snapshot of the global occupancy ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerInfo {
    pub session_only: usize,
    pub committed: usize,
    pub total: usize,
    pub committed_cursor: i32,
    pub session_cursor: Option<i32>,
}

/// Result of a commit or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUpdate {
    pub committed: usize,
    pub cursor: i32,
    pub persisted: bool,
}

impl fmt::Display for LedgerUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} committed slots, cursor {}{}",
            self.committed,
            self.cursor,
            if self.persisted { "" } else { " (not persisted)" }
        )
    }
}

/// Body of a scoped commit: the cursor a per-user generation returned.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedCommitRequest {
    pub scope: UserScope,
    pub cursor: i32,
}
