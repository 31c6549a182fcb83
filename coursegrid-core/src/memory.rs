//! Dataset-backed collaborators.
//!
//! [`MemoryStore`] implements every repository and the change log over a
//! JSON [`Dataset`], which is enough to drive the server and CLI without a
//! database.

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    DateRange, Error, Recurrence, RecurrenceId, Result, ScheduleEntry, ScheduleOverride,
    ScheduleStatus, ScheduleTemplate, SectionId, Semester, SemesterId, StudentId, TeacherId,
    TemplateId, UserId,
    repository::{EnrollmentRepository, ScheduleRepository},
    snapshot::{ChangeLogEntry, ChangeLogStore, NotificationPayload, NotificationPublisher},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Enrolled,
    Waitlisted,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: StudentId,
    pub section_id: SectionId,
    pub semester_id: SemesterId,
    pub status: EnrollmentStatus,
}

/// Everything the engine reads, as stored in a JSON file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub templates: Vec<ScheduleTemplate>,
    #[serde(default)]
    pub recurrences: Vec<Recurrence>,
    #[serde(default)]
    pub overrides: Vec<ScheduleOverride>,
    #[serde(default)]
    pub semesters: Vec<Semester>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

impl Dataset {
    /// Parses and validates a dataset.
    pub fn from_json(json_data: &str) -> Result<Self> {
        let dataset: Self = serde_json::from_str(json_data)?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Loading is the write boundary for this store, so bad rows are rejected here.
    pub fn validate(&self) -> Result<()> {
        for template in &self.templates {
            template.validate()?;
        }
        for exception in &self.overrides {
            exception.validate()?;
        }
        Ok(())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|err| {
            Error::Config(format!(
                "Failed to read dataset {}: {}",
                path_ref.display(),
                err
            ))
        })?;
        Self::from_json(&content)
    }

    fn entries_where<F>(
        &self,
        statuses: &[ScheduleStatus],
        window: (DateTime<Utc>, DateTime<Utc>),
        keep: F,
    ) -> Vec<ScheduleEntry>
    where
        F: Fn(&ScheduleTemplate) -> bool,
    {
        let recurrences: HashMap<RecurrenceId, &Recurrence> =
            self.recurrences.iter().map(|r| (r.id, r)).collect();
        let (start, end) = window;
        let dates = DateRange::new(start.date_naive(), end.date_naive());

        self.templates
            .iter()
            .filter(|t| statuses.contains(&t.status) && keep(*t))
            .filter_map(|t| {
                let recurrence = t
                    .recurrence_id
                    .and_then(|id| recurrences.get(&id))
                    .map(|r| (*r).clone());
                let touches = match &recurrence {
                    Some(r) => DateRange::new(r.start_date, r.end_date).overlaps(&dates),
                    None => t.start <= end && t.end >= start,
                };
                touches.then(|| ScheduleEntry {
                    template: t.clone(),
                    recurrence,
                })
            })
            .collect()
    }
}

/// In-process implementation of the schedule collaborators
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Dataset>,
    changes: RwLock<Vec<ChangeLogEntry>>,
}

impl MemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            data: RwLock::new(dataset),
            changes: RwLock::new(Vec::new()),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Dataset::from_path(path)?))
    }

    /// Recorded audit entries, oldest first.
    pub async fn changes(&self) -> Vec<ChangeLogEntry> {
        self.changes.read().await.clone()
    }
}

#[async_trait]
impl ScheduleRepository for MemoryStore {
    async fn fetch_by_section_ids(
        &self,
        section_ids: &[SectionId],
        statuses: &[ScheduleStatus],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>> {
        let data = self.data.read().await;
        Ok(data.entries_where(statuses, (start, end), |t| {
            section_ids.contains(&t.section_id)
        }))
    }

    async fn fetch_by_teacher(
        &self,
        teacher_id: TeacherId,
        statuses: &[ScheduleStatus],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>> {
        let data = self.data.read().await;
        Ok(data.entries_where(statuses, (start, end), |t| {
            t.teacher_id == Some(teacher_id)
        }))
    }

    async fn fetch_overrides_by_recurrence_ids(
        &self,
        recurrence_ids: &[RecurrenceId],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleOverride>> {
        let data = self.data.read().await;
        let window = DateRange::new(start, end);
        Ok(data
            .overrides
            .iter()
            .filter(|o| {
                recurrence_ids.contains(&o.recurrence_id) && window.contains(o.original_date)
            })
            .cloned()
            .collect())
    }

    async fn find_template(&self, id: TemplateId) -> Result<Option<ScheduleTemplate>> {
        let data = self.data.read().await;
        Ok(data.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn update_status(
        &self,
        id: TemplateId,
        expected: ScheduleStatus,
        next: ScheduleStatus,
    ) -> Result<ScheduleTemplate> {
        let mut data = self.data.write().await;
        let template = data
            .templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound {
                kind: "schedule",
                id,
            })?;
        if template.status != expected {
            return Err(Error::InvalidTransition {
                from: template.status,
                to: next,
            });
        }
        template.status = next;
        Ok(template.clone())
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn enrolled_section_ids(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> Result<Vec<SectionId>> {
        let data = self.data.read().await;
        let mut sections: Vec<SectionId> = data
            .enrollments
            .iter()
            .filter(|e| {
                e.student_id == student_id
                    && e.semester_id == semester_id
                    && e.status == EnrollmentStatus::Enrolled
            })
            .map(|e| e.section_id)
            .collect();
        sections.sort_unstable();
        sections.dedup();
        Ok(sections)
    }

    async fn enrolled_student_ids(
        &self,
        section_id: SectionId,
        semester_id: Option<SemesterId>,
    ) -> Result<Vec<StudentId>> {
        let data = self.data.read().await;
        let mut students: Vec<StudentId> = data
            .enrollments
            .iter()
            .filter(|e| {
                e.section_id == section_id
                    && e.status == EnrollmentStatus::Enrolled
                    && semester_id.is_none_or(|id| e.semester_id == id)
            })
            .map(|e| e.student_id)
            .collect();
        students.sort_unstable();
        students.dedup();
        Ok(students)
    }

    async fn find_semester(&self, id: SemesterId) -> Result<Option<Semester>> {
        let data = self.data.read().await;
        Ok(data.semesters.iter().find(|s| s.id == id).cloned())
    }

    async fn semester_containing(&self, date: NaiveDate) -> Result<Option<Semester>> {
        let data = self.data.read().await;
        Ok(data
            .semesters
            .iter()
            .find(|s| s.range().contains(date))
            .cloned())
    }
}

#[async_trait]
impl ChangeLogStore for MemoryStore {
    async fn append(&self, entry: ChangeLogEntry) -> Result<()> {
        self.changes.write().await.push(entry);
        Ok(())
    }
}

/// Publisher that only writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl NotificationPublisher for LogPublisher {
    async fn publish(&self, recipients: &[UserId], payload: &NotificationPayload) -> Result<()> {
        let body = serde_json::to_string(payload)?;
        tracing::info!("notify {:?}: {}", recipients, body);
        Ok(())
    }
}
