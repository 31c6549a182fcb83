use std::sync::Arc;

use crate::{
    DateRange, Error, Occurrence, RecurrenceId, Result, ScheduleEntry, ScheduleStatus,
    ScheduleTemplate, SectionId, TeacherId, TemplateId, UserId, Visibility,
    conflict::ConflictDetector,
    occurrence::generate_occurrences,
    repository::{EnrollmentRepository, ScheduleRepository},
    snapshot::{
        ChangeLogEntry, ChangeRecorder, ChangeType, ScheduleSnapshot, build_change_snapshot,
        build_notification_payload,
    },
};

/// Fetch → expand → resolve → sort pipeline over the collaborators
#[derive(Clone)]
pub struct ScheduleService {
    schedules: Arc<dyn ScheduleRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    recorder: ChangeRecorder,
}

impl ScheduleService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        recorder: ChangeRecorder,
    ) -> Self {
        Self {
            schedules,
            enrollments,
            recorder,
        }
    }

    pub fn enrollments(&self) -> &dyn EnrollmentRepository {
        self.enrollments.as_ref()
    }

    pub fn conflict_detector(&self) -> ConflictDetector<'_> {
        ConflictDetector::new(self)
    }

    /// Occurrences of the given sections within `range`, sorted by start.
    pub async fn section_occurrences(
        &self,
        section_ids: &[SectionId],
        range: DateRange,
        visibility: Visibility,
    ) -> Result<Vec<Occurrence>> {
        if range.is_empty() || section_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (start, end) = range.utc_bounds();
        let entries = self
            .schedules
            .fetch_by_section_ids(section_ids, visibility.statuses(), start, end)
            .await?;
        self.resolve(&entries, range, visibility).await
    }

    /// Occurrences taught by `teacher_id` within `range`, sorted by start.
    pub async fn teacher_occurrences(
        &self,
        teacher_id: TeacherId,
        range: DateRange,
        visibility: Visibility,
    ) -> Result<Vec<Occurrence>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let (start, end) = range.utc_bounds();
        let entries = self
            .schedules
            .fetch_by_teacher(teacher_id, visibility.statuses(), start, end)
            .await?;
        self.resolve(&entries, range, visibility).await
    }

    async fn resolve(
        &self,
        entries: &[ScheduleEntry],
        range: DateRange,
        visibility: Visibility,
    ) -> Result<Vec<Occurrence>> {
        let mut recurrence_ids: Vec<RecurrenceId> = entries
            .iter()
            .filter_map(|entry| entry.recurrence.as_ref().map(|r| r.id))
            .collect();
        recurrence_ids.sort_unstable();
        recurrence_ids.dedup();

        let overrides = if recurrence_ids.is_empty() {
            Vec::new()
        } else {
            self.schedules
                .fetch_overrides_by_recurrence_ids(&recurrence_ids, range.start, range.end)
                .await?
        };

        Ok(generate_occurrences(entries, &overrides, range, visibility))
    }

    /// Moves a template through its lifecycle, recording the change and
    /// notifying the section.
    ///
    /// The status is written with a compare-and-set on the status that was
    /// checked, so a concurrent change makes this call fail with
    /// `Error::InvalidTransition`. The audit entry must be stored for the call
    /// to succeed: when it cannot be, the status is put back. Notification
    /// delivery is best-effort.
    pub async fn change_status(
        &self,
        template_id: TemplateId,
        next: ScheduleStatus,
        actor_id: UserId,
        reason: Option<String>,
    ) -> Result<ScheduleSnapshot> {
        let current = self
            .schedules
            .find_template(template_id)
            .await?
            .ok_or(Error::NotFound {
                kind: "schedule",
                id: template_id,
            })?;
        current.status.ensure_transition(next)?;

        let before = build_change_snapshot(&current, None);
        let updated = self
            .schedules
            .update_status(template_id, current.status, next)
            .await?;
        let after = build_change_snapshot(&updated, Some(next));
        let change_type = ChangeType::for_status(next);

        let recorded = self
            .recorder
            .record(ChangeLogEntry::new(
                template_id,
                actor_id,
                change_type,
                Some(before.clone()),
                Some(after.clone()),
                reason.clone(),
            ))
            .await;
        if let Err(e) = recorded {
            if let Err(rollback) = self
                .schedules
                .update_status(template_id, next, current.status)
                .await
            {
                tracing::error!(
                    "Failed to restore schedule {} to {} after audit failure: {}",
                    template_id,
                    current.status,
                    rollback
                );
            }
            return Err(e);
        }

        tracing::info!(
            "schedule {} {} -> {} by user {}",
            template_id,
            before.status,
            after.status,
            actor_id
        );

        let recipients = self.recipients(&updated, actor_id).await;
        let payload = build_notification_payload(&before, &after, change_type, reason.as_deref());
        self.recorder.notify(&recipients, &payload).await;

        Ok(after)
    }

    /// Enrolled students of the template's semester plus its teacher, minus the actor.
    async fn recipients(&self, template: &ScheduleTemplate, actor_id: UserId) -> Vec<UserId> {
        let semester_id = match self
            .enrollments
            .semester_containing(template.start.date_naive())
            .await
        {
            Ok(semester) => semester.map(|s| s.id),
            Err(e) => {
                tracing::warn!("Failed to resolve semester for schedule {}: {}", template.id, e);
                None
            }
        };

        let mut recipients = match self
            .enrollments
            .enrolled_student_ids(template.section_id, semester_id)
            .await
        {
            Ok(students) => students,
            Err(e) => {
                tracing::warn!(
                    "Failed to load recipients for section {}: {}",
                    template.section_id,
                    e
                );
                Vec::new()
            }
        };
        if let Some(teacher_id) = template.teacher_id {
            if !recipients.contains(&teacher_id) {
                recipients.push(teacher_id);
            }
        }
        recipients.retain(|id| *id != actor_id);
        recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ChangeLogStore, NotificationPayload, NotificationPublisher, ScheduleOverride,
        memory::{Dataset, LogPublisher, MemoryStore},
    };
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::sync::Mutex;
    use tokio::sync::Barrier;

    const DATASET: &str = r#"{
        "templates": [
            {
                "id": 1, "section_id": 10, "title": "Algorithms",
                "start": "2025-01-06T10:00:00Z", "end": "2025-01-06T11:30:00Z",
                "status": "PUBLISHED", "teacher_id": 50, "recurrence_id": 100
            },
            {
                "id": 2, "section_id": 20, "title": "Databases",
                "start": "2025-01-06T11:00:00Z", "end": "2025-01-06T12:00:00Z",
                "status": "PUBLISHED", "teacher_id": 51, "recurrence_id": 200
            },
            {
                "id": 3, "section_id": 30, "title": "Networks",
                "start": "2025-01-06T11:30:00Z", "end": "2025-01-06T12:30:00Z",
                "status": "PUBLISHED", "teacher_id": 50, "recurrence_id": 300
            },
            {
                "id": 4, "section_id": 40, "title": "Ethics",
                "start": "2025-01-07T09:00:00Z", "end": "2025-01-07T10:00:00Z",
                "status": "CANCELLED", "recurrence_id": 400
            },
            {
                "id": 5, "section_id": 50, "title": "Draft Lab",
                "start": "2025-01-08T09:00:00Z", "end": "2025-01-08T10:00:00Z",
                "status": "DRAFT"
            }
        ],
        "recurrences": [
            { "id": 100, "rule": "BYDAY=MO,WE", "start_date": "2025-01-06", "end_date": "2025-03-31" },
            { "id": 200, "rule": "BYDAY=WE", "start_date": "2025-01-06", "end_date": "2025-03-31" },
            { "id": 300, "rule": "BYDAY=MO", "start_date": "2025-01-06", "end_date": "2025-03-31" },
            { "id": 400, "rule": "BYDAY=TU", "start_date": "2025-01-06", "end_date": "2025-03-31" }
        ],
        "overrides": [
            { "recurrence_id": 100, "original_date": "2025-01-13", "type": "CANCEL", "reason": "holiday" }
        ],
        "semesters": [
            { "id": 1, "name": "Spring 2025", "start_date": "2025-01-06", "end_date": "2025-05-30" },
            { "id": 2, "name": "Summer 2025", "start_date": "2025-06-01", "end_date": "2025-08-31" }
        ],
        "enrollments": [
            { "student_id": 7, "section_id": 10, "semester_id": 1, "status": "ENROLLED" },
            { "student_id": 8, "section_id": 10, "semester_id": 2, "status": "ENROLLED" },
            { "student_id": 9, "section_id": 40, "semester_id": 1, "status": "ENROLLED" }
        ]
    }"#;

    #[derive(Default)]
    struct RecordingPublisher(Mutex<Vec<(Vec<UserId>, NotificationPayload)>>);

    #[async_trait]
    impl NotificationPublisher for RecordingPublisher {
        async fn publish(
            &self,
            recipients: &[UserId],
            payload: &NotificationPayload,
        ) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((recipients.to_vec(), payload.clone()));
            Ok(())
        }
    }

    fn service_with(
        publisher: Arc<dyn NotificationPublisher>,
    ) -> (ScheduleService, Arc<MemoryStore>) {
        let store = store();
        let recorder = ChangeRecorder::new(store.clone(), publisher);
        (ScheduleService::new(store.clone(), store.clone(), recorder), store)
    }

    struct FailingLog;

    #[async_trait]
    impl ChangeLogStore for FailingLog {
        async fn append(&self, _: ChangeLogEntry) -> Result<()> {
            Err(Error::Repository("audit table unavailable".to_string()))
        }
    }

    /// Holds every `find_template` call until two callers have read the template.
    struct GatedSchedules {
        inner: Arc<MemoryStore>,
        gate: Barrier,
    }

    #[async_trait]
    impl ScheduleRepository for GatedSchedules {
        async fn fetch_by_section_ids(
            &self,
            section_ids: &[SectionId],
            statuses: &[ScheduleStatus],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<ScheduleEntry>> {
            self.inner
                .fetch_by_section_ids(section_ids, statuses, start, end)
                .await
        }

        async fn fetch_by_teacher(
            &self,
            teacher_id: TeacherId,
            statuses: &[ScheduleStatus],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<ScheduleEntry>> {
            self.inner
                .fetch_by_teacher(teacher_id, statuses, start, end)
                .await
        }

        async fn fetch_overrides_by_recurrence_ids(
            &self,
            recurrence_ids: &[RecurrenceId],
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<ScheduleOverride>> {
            self.inner
                .fetch_overrides_by_recurrence_ids(recurrence_ids, start, end)
                .await
        }

        async fn find_template(&self, id: TemplateId) -> Result<Option<ScheduleTemplate>> {
            let template = self.inner.find_template(id).await;
            self.gate.wait().await;
            template
        }

        async fn update_status(
            &self,
            id: TemplateId,
            expected: ScheduleStatus,
            next: ScheduleStatus,
        ) -> Result<ScheduleTemplate> {
            self.inner.update_status(id, expected, next).await
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(Dataset::from_json(DATASET).unwrap()))
    }

    fn service() -> ScheduleService {
        service_with(Arc::new(LogPublisher)).0
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_section_occurrences_apply_overrides() {
        let occurrences = service()
            .section_occurrences(
                &[10],
                DateRange::new(d(2025, 1, 6), d(2025, 1, 15)),
                Visibility::Default,
            )
            .await
            .unwrap();
        let dates: Vec<_> = occurrences.iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![d(2025, 1, 6), d(2025, 1, 8), d(2025, 1, 15)]);
    }

    #[tokio::test]
    async fn test_admin_view_lists_cancelled() {
        let service = service();
        let range = DateRange::new(d(2025, 1, 6), d(2025, 1, 15));

        let hidden = service
            .section_occurrences(&[40], range, Visibility::Default)
            .await
            .unwrap();
        assert!(hidden.is_empty());

        let admin = service
            .section_occurrences(&[10, 40], range, Visibility::IncludeCancelled)
            .await
            .unwrap();
        assert!(admin.iter().any(|o| o.section_id == 40));
        assert!(
            admin
                .iter()
                .any(|o| o.date == d(2025, 1, 13) && o.status == ScheduleStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_teacher_occurrences() {
        let occurrences = service()
            .teacher_occurrences(
                50,
                DateRange::new(d(2025, 1, 6), d(2025, 1, 8)),
                Visibility::Default,
            )
            .await
            .unwrap();
        let titles: Vec<_> = occurrences.iter().map(|o| o.title.as_str()).collect();
        assert_eq!(titles, vec!["Algorithms", "Networks", "Algorithms"]);
    }

    #[tokio::test]
    async fn test_conflict_detection() {
        let service = service();
        let detector = service.conflict_detector();

        // Databases on Wednesday 11:00 overlaps Algorithms 10:00-11:30
        assert!(detector.has_conflict(7, 20, 1).await.unwrap());
        // Networks starts exactly when Algorithms ends
        assert!(!detector.has_conflict(7, 30, 1).await.unwrap());
        // Re-checking an already enrolled section ignores itself
        assert!(!detector.has_conflict(7, 10, 1).await.unwrap());
        // No enrollments in that semester
        assert!(!detector.has_conflict(7, 20, 2).await.unwrap());
        // Candidate has no visible occurrences
        assert!(!detector.has_conflict(7, 40, 1).await.unwrap());

        let conflict = detector.find_conflict(7, 20, 1).await.unwrap().unwrap();
        assert_eq!(conflict.candidate.section_id, 20);
        assert_eq!(conflict.existing.section_id, 10);
        assert_eq!(conflict.candidate.date, d(2025, 1, 8));
    }

    #[tokio::test]
    async fn test_conflict_unknown_semester() {
        let service = service();
        let result = service.conflict_detector().has_conflict(7, 20, 99).await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                kind: "semester",
                id: 99
            })
        ));
    }

    #[tokio::test]
    async fn test_change_status_records_and_notifies() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (service, store) = service_with(publisher.clone());

        let after = service
            .change_status(1, ScheduleStatus::Cancelled, 900, Some("course withdrawn".into()))
            .await
            .unwrap();
        assert_eq!(after.status, ScheduleStatus::Cancelled);

        let changes = store.changes().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Cancelled);
        assert_eq!(
            changes[0].old_snapshot.as_ref().map(|s| s.status),
            Some(ScheduleStatus::Published)
        );

        let sent = publisher.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // Student 8 is enrolled in section 10 for the summer, not this semester
        assert_eq!(sent[0].0, vec![7, 50]);
        assert_eq!(sent[0].1.reason.as_deref(), Some("course withdrawn"));
    }

    #[tokio::test]
    async fn test_change_status_skips_acting_teacher() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (service, _) = service_with(publisher.clone());

        service
            .change_status(3, ScheduleStatus::Completed, 50, None)
            .await
            .unwrap();

        // Section 30 has no students and the teacher made the change
        assert!(publisher.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_transitions_from_same_status() {
        let store = store();
        let schedules = Arc::new(GatedSchedules {
            inner: store.clone(),
            gate: Barrier::new(2),
        });
        let recorder = ChangeRecorder::new(store.clone(), Arc::new(LogPublisher));
        let service = ScheduleService::new(schedules, store.clone(), recorder);

        // Both calls read PUBLISHED before either writes
        let (cancel, complete) = tokio::join!(
            service.change_status(1, ScheduleStatus::Cancelled, 900, None),
            service.change_status(1, ScheduleStatus::Completed, 900, None),
        );
        assert_ne!(cancel.is_ok(), complete.is_ok());

        let winner = cancel.as_ref().or(complete.as_ref()).unwrap().status;
        let loser = cancel.as_ref().err().or(complete.as_ref().err()).unwrap();
        assert!(matches!(
            loser,
            Error::InvalidTransition { from, .. } if *from == winner
        ));

        let template = store.find_template(1).await.unwrap().unwrap();
        assert_eq!(template.status, winner);

        let changes = store.changes().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].new_snapshot.as_ref().map(|s| s.status),
            Some(winner)
        );
    }

    #[tokio::test]
    async fn test_change_status_restores_status_when_audit_fails() {
        let store = store();
        let publisher = Arc::new(RecordingPublisher::default());
        let recorder = ChangeRecorder::new(Arc::new(FailingLog), publisher.clone());
        let service = ScheduleService::new(store.clone(), store.clone(), recorder);

        let result = service
            .change_status(1, ScheduleStatus::Cancelled, 900, None)
            .await;
        assert!(matches!(result, Err(Error::Repository(_))));

        let template = store.find_template(1).await.unwrap().unwrap();
        assert_eq!(template.status, ScheduleStatus::Published);
        assert!(publisher.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_status_rejects_invalid_transition() {
        let (service, store) = service_with(Arc::new(LogPublisher));

        let result = service
            .change_status(4, ScheduleStatus::Published, 900, None)
            .await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        assert!(store.changes().await.is_empty());

        let missing = service
            .change_status(404, ScheduleStatus::Published, 900, None)
            .await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }
}
