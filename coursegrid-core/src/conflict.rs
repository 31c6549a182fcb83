use serde::{Deserialize, Serialize};

use crate::{
    Error, Occurrence, Result, SectionId, SemesterId, StudentId, Visibility,
    service::ScheduleService,
};

/// Half-open overlap: sessions that merely touch do not conflict.
pub fn overlaps(a: &Occurrence, b: &Occurrence) -> bool {
    a.start < b.end && a.end > b.start
}

/// First `(candidate, existing)` pair whose sessions overlap.
pub fn find_conflict<'a>(
    candidate: &'a [Occurrence],
    existing: &'a [Occurrence],
) -> Option<(&'a Occurrence, &'a Occurrence)> {
    candidate.iter().find_map(|c| {
        existing
            .iter()
            .find(|e| overlaps(c, e))
            .map(|e| (c, e))
    })
}

/// Whether any candidate occurrence overlaps any existing one.
pub fn has_conflict(candidate: &[Occurrence], existing: &[Occurrence]) -> bool {
    find_conflict(candidate, existing).is_some()
}

/// A detected clash between a candidate section and an enrolled one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub candidate: Occurrence,
    pub existing: Occurrence,
}

/// Registration-time conflict check over the schedule collaborators
pub struct ConflictDetector<'a> {
    service: &'a ScheduleService,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(service: &'a ScheduleService) -> Self {
        Self { service }
    }

    /// Whether enrolling `student_id` in `section_id` would clash with the
    /// student's other sections in the semester.
    pub async fn has_conflict(
        &self,
        student_id: StudentId,
        section_id: SectionId,
        semester_id: SemesterId,
    ) -> Result<bool> {
        Ok(self
            .find_conflict(student_id, section_id, semester_id)
            .await?
            .is_some())
    }

    /// Same as [`Self::has_conflict`] but returns the first clashing pair.
    pub async fn find_conflict(
        &self,
        student_id: StudentId,
        section_id: SectionId,
        semester_id: SemesterId,
    ) -> Result<Option<Conflict>> {
        let enrollments = self.service.enrollments();
        let semester = enrollments
            .find_semester(semester_id)
            .await?
            .ok_or(Error::NotFound {
                kind: "semester",
                id: semester_id,
            })?;

        let existing_sections: Vec<SectionId> = enrollments
            .enrolled_section_ids(student_id, semester_id)
            .await?
            .into_iter()
            .filter(|id| *id != section_id)
            .collect();
        if existing_sections.is_empty() {
            return Ok(None);
        }

        let range = semester.range();
        let candidate = self
            .service
            .section_occurrences(&[section_id], range, Visibility::Default)
            .await?;
        if candidate.is_empty() {
            return Ok(None);
        }

        let existing = self
            .service
            .section_occurrences(&existing_sections, range, Visibility::Default)
            .await?;

        let conflict = find_conflict(&candidate, &existing).map(|(c, e)| Conflict {
            candidate: c.clone(),
            existing: e.clone(),
        });
        if let Some(conflict) = &conflict {
            tracing::debug!(
                "student {} section {} clashes with section {} on {}",
                student_id,
                section_id,
                conflict.existing.section_id,
                conflict.candidate.date
            );
        }
        Ok(conflict)
    }
}
