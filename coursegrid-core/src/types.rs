use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, range::DateRange};

pub type TemplateId = i64;
pub type SectionId = i64;
pub type RecurrenceId = i64;
pub type TeacherId = i64;
pub type StudentId = i64;
pub type SemesterId = i64;
pub type UserId = i64;

/// Persisted status of a schedule template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Draft,
    Published,
    Rescheduled,
    Cancelled,
    Completed,
    Archived,
}

impl ScheduleStatus {
    pub const ALL: [Self; 6] = [
        Self::Draft,
        Self::Published,
        Self::Rescheduled,
        Self::Cancelled,
        Self::Completed,
        Self::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Rescheduled => "RESCHEDULED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Terminal statuses accept no further mutation.
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Cancelled | Self::Archived => true,
            Self::Draft | Self::Published | Self::Rescheduled | Self::Completed => false,
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// DRAFT → PUBLISHED → {RESCHEDULED, CANCELLED, COMPLETED} → ARCHIVED.
    /// A rescheduled template can still be cancelled or completed.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ScheduleStatus::*;

        match (self, next) {
            (Draft, Published) => true,
            (Published, Rescheduled | Cancelled | Completed) => true,
            (Rescheduled, Cancelled | Completed | Archived) => true,
            (Completed, Archived) => true,
            (Cancelled | Archived, _) => false,
            (Draft | Published | Rescheduled | Completed, _) => false,
        }
    }

    /// Returns `Error::InvalidTransition` when the lifecycle forbids the move.
    pub fn ensure_transition(self, next: Self) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which occurrences a read path wants to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Student/teacher view: cancelled templates and cancelled dates are hidden
    #[default]
    Default,
    /// Admin view: cancelled templates and cancelled dates are listed with CANCELLED status
    IncludeCancelled,
}

impl Visibility {
    /// Template statuses the repository should return for this view.
    pub fn statuses(self) -> &'static [ScheduleStatus] {
        match self {
            Self::Default => &[
                ScheduleStatus::Published,
                ScheduleStatus::Rescheduled,
                ScheduleStatus::Completed,
            ],
            Self::IncludeCancelled => &[
                ScheduleStatus::Published,
                ScheduleStatus::Rescheduled,
                ScheduleStatus::Completed,
                ScheduleStatus::Cancelled,
            ],
        }
    }
}

/// A class session template; its start/end carry the time-of-day anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTemplate {
    pub id: TemplateId,
    pub section_id: SectionId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Display-only label, never used for arithmetic
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub online_url: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<TeacherId>,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub recurrence_id: Option<RecurrenceId>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ScheduleTemplate {
    /// Weekday of the first session, used when a rule has no BYDAY
    pub fn native_weekday(&self) -> Weekday {
        self.start.weekday()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Calendar dates touched by the session itself.
    pub fn date_span(&self) -> DateRange {
        DateRange::new(self.start.date_naive(), self.end.date_naive())
    }

    /// Mutation-boundary check; the read path trusts persisted data.
    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(Error::Validation(format!(
                "schedule {} must end after it starts ({} >= {})",
                self.id, self.start, self.end
            )));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Validation(format!(
                "schedule {} must have a title",
                self.id
            )));
        }
        Ok(())
    }
}

/// Weekly repeat rule plus the dates bounding the whole series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub id: RecurrenceId,
    #[serde(default)]
    pub rule: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideKind {
    Reschedule,
    Cancel,
}

/// A per-date exception on one recurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub recurrence_id: RecurrenceId,
    pub original_date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: OverrideKind,
    #[serde(default)]
    pub new_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub new_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub new_location: Option<String>,
    #[serde(default)]
    pub new_teacher_id: Option<TeacherId>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ScheduleOverride {
    pub fn cancel(recurrence_id: RecurrenceId, original_date: NaiveDate) -> Self {
        Self {
            recurrence_id,
            original_date,
            kind: OverrideKind::Cancel,
            new_start: None,
            new_end: None,
            new_location: None,
            new_teacher_id: None,
            reason: None,
        }
    }

    pub fn reschedule(recurrence_id: RecurrenceId, original_date: NaiveDate) -> Self {
        Self {
            kind: OverrideKind::Reschedule,
            ..Self::cancel(recurrence_id, original_date)
        }
    }

    pub fn with_times(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.new_start = start;
        self.new_end = end;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Mutation-boundary check for overrides that carry both instants.
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.new_start, self.new_end) {
            if end <= start {
                return Err(Error::Validation(format!(
                    "override for recurrence {} on {} must end after it starts",
                    self.recurrence_id, self.original_date
                )));
            }
        }
        Ok(())
    }
}

/// A template together with its recurrence, as fetched from the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub template: ScheduleTemplate,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
}

impl ScheduleEntry {
    pub fn single(template: ScheduleTemplate) -> Self {
        Self {
            template,
            recurrence: None,
        }
    }

    pub fn recurring(template: ScheduleTemplate, recurrence: Recurrence) -> Self {
        Self {
            template,
            recurrence: Some(recurrence),
        }
    }
}

/// Identity of an occurrence: the template and the date it falls on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccurrenceId {
    pub template_id: TemplateId,
    pub date: NaiveDate,
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.template_id, self.date.format("%Y%m%d"))
    }
}

/// One concrete dated session, computed on every read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub section_id: SectionId,
    pub recurrence_id: Option<RecurrenceId>,
    pub title: String,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub location: Option<String>,
    pub online_url: Option<String>,
    pub teacher_id: Option<TeacherId>,
    /// Status after override resolution
    pub status: ScheduleStatus,
    pub is_override: bool,
    pub reason: Option<String>,
}

/// Academic term bounding enrollments and conflict checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semester {
    pub id: SemesterId,
    #[serde(default)]
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Semester {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}
