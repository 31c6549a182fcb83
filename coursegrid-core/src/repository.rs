//! Read-side collaborator interfaces.
//!
//! The engine never talks to storage itself; callers plug an implementation
//! of these traits into [`crate::service::ScheduleService`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    RecurrenceId, Result, ScheduleEntry, ScheduleOverride, ScheduleStatus, ScheduleTemplate,
    SectionId, Semester, SemesterId, StudentId, TeacherId, TemplateId,
};

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Templates of the given sections whose series or session touches `[start, end]`.
    async fn fetch_by_section_ids(
        &self,
        section_ids: &[SectionId],
        statuses: &[ScheduleStatus],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>>;

    /// Templates taught by `teacher_id` whose series or session touches `[start, end]`.
    async fn fetch_by_teacher(
        &self,
        teacher_id: TeacherId,
        statuses: &[ScheduleStatus],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>>;

    /// Overrides of the given recurrences with an original date in `[start, end]`.
    async fn fetch_overrides_by_recurrence_ids(
        &self,
        recurrence_ids: &[RecurrenceId],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleOverride>>;

    async fn find_template(&self, id: TemplateId) -> Result<Option<ScheduleTemplate>>;

    /// Sets the status to `next` only if it is still `expected`, as one atomic step.
    ///
    /// Returns `Error::InvalidTransition` from the actual status when another
    /// writer got there first. Lifecycle rules are the caller's concern.
    async fn update_status(
        &self,
        id: TemplateId,
        expected: ScheduleStatus,
        next: ScheduleStatus,
    ) -> Result<ScheduleTemplate>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Sections the student is actively enrolled in for the semester.
    async fn enrolled_section_ids(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> Result<Vec<SectionId>>;

    /// Students actively enrolled in the section, limited to one semester when given.
    async fn enrolled_student_ids(
        &self,
        section_id: SectionId,
        semester_id: Option<SemesterId>,
    ) -> Result<Vec<StudentId>>;

    async fn find_semester(&self, id: SemesterId) -> Result<Option<Semester>>;

    /// The semester whose dates include `date`.
    async fn semester_containing(&self, date: NaiveDate) -> Result<Option<Semester>>;
}
