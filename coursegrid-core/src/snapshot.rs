//! Audit snapshots and notification payloads for schedule mutations.
//!
//! This module only shapes data. Storage and delivery belong to the
//! [`ChangeLogStore`] and [`NotificationPublisher`] collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    RecurrenceId, Result, ScheduleStatus, ScheduleTemplate, SectionId, TeacherId, TemplateId,
    UserId,
};

/// Immutable copy of a template's mutable fields at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub template_id: TemplateId,
    pub section_id: SectionId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub location: Option<String>,
    pub online_url: Option<String>,
    pub teacher_id: Option<TeacherId>,
    pub status: ScheduleStatus,
    pub recurrence_id: Option<RecurrenceId>,
}

/// Captures `template` for the audit log.
///
/// `status_override` records a status other than the persisted one, e.g. the
/// target of a pending transition. Terminal templates snapshot like any other.
pub fn build_change_snapshot(
    template: &ScheduleTemplate,
    status_override: Option<ScheduleStatus>,
) -> ScheduleSnapshot {
    ScheduleSnapshot {
        template_id: template.id,
        section_id: template.section_id,
        title: template.title.clone(),
        start: template.start,
        end: template.end,
        timezone: template.timezone.clone(),
        location: template.location.clone(),
        online_url: template.online_url.clone(),
        teacher_id: template.teacher_id,
        status: status_override.unwrap_or(template.status),
        recurrence_id: template.recurrence_id,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Created,
    Updated,
    StatusChanged,
    Rescheduled,
    Cancelled,
}

impl ChangeType {
    /// Change type recorded when a template moves to `status`.
    pub fn for_status(status: ScheduleStatus) -> Self {
        match status {
            ScheduleStatus::Rescheduled => Self::Rescheduled,
            ScheduleStatus::Cancelled => Self::Cancelled,
            ScheduleStatus::Draft => Self::Created,
            ScheduleStatus::Published | ScheduleStatus::Completed | ScheduleStatus::Archived => {
                Self::StatusChanged
            }
        }
    }
}

/// One audit-log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: Uuid,
    pub schedule_event_id: TemplateId,
    pub actor_id: UserId,
    pub change_type: ChangeType,
    pub old_snapshot: Option<ScheduleSnapshot>,
    pub new_snapshot: Option<ScheduleSnapshot>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(
        schedule_event_id: TemplateId,
        actor_id: UserId,
        change_type: ChangeType,
        old_snapshot: Option<ScheduleSnapshot>,
        new_snapshot: Option<ScheduleSnapshot>,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_event_id,
            actor_id,
            change_type,
            old_snapshot,
            new_snapshot,
            reason,
            timestamp: Utc::now(),
        }
    }
}

/// Payload handed to the notification publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub class_section_id: SectionId,
    pub schedule_event_id: TemplateId,
    pub occurrence_date: Option<NaiveDate>,
    pub from_start: Option<DateTime<Utc>>,
    pub from_end: Option<DateTime<Utc>>,
    pub to_start: Option<DateTime<Utc>>,
    pub to_end: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub change_type: ChangeType,
    pub link_route: String,
}

/// Payload for a template-level change.
pub fn build_notification_payload(
    before: &ScheduleSnapshot,
    after: &ScheduleSnapshot,
    change_type: ChangeType,
    reason: Option<&str>,
) -> NotificationPayload {
    NotificationPayload {
        class_section_id: after.section_id,
        schedule_event_id: after.template_id,
        occurrence_date: None,
        from_start: Some(before.start),
        from_end: Some(before.end),
        to_start: Some(after.start),
        to_end: Some(after.end),
        reason: reason.map(str::to_string),
        change_type,
        link_route: link_route(after.section_id, None),
    }
}

/// In-app route for a section's schedule, optionally focused on one date.
pub fn link_route(section_id: SectionId, date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => format!(
            "/sections/{}/schedule?date={}",
            section_id,
            date.format("%Y-%m-%d")
        ),
        None => format!("/sections/{section_id}/schedule"),
    }
}

/// Audit-log sink
#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    async fn append(&self, entry: ChangeLogEntry) -> Result<()>;
}

/// Notification delivery, fire-and-forget from the engine's point of view
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, recipients: &[UserId], payload: &NotificationPayload) -> Result<()>;
}

/// Hands snapshots and payloads to the collaborators
#[derive(Clone)]
pub struct ChangeRecorder {
    log: Arc<dyn ChangeLogStore>,
    publisher: Arc<dyn NotificationPublisher>,
}

impl ChangeRecorder {
    pub fn new(log: Arc<dyn ChangeLogStore>, publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self { log, publisher }
    }

    /// Appends to the audit log; store failures propagate.
    pub async fn record(&self, entry: ChangeLogEntry) -> Result<()> {
        self.log.append(entry).await
    }

    /// Publishes to `recipients`. Failures are logged and swallowed so the
    /// mutation that triggered them still succeeds.
    pub async fn notify(&self, recipients: &[UserId], payload: &NotificationPayload) {
        if recipients.is_empty() {
            return;
        }
        if let Err(e) = self.publisher.publish(recipients, payload).await {
            tracing::warn!(
                "Failed to publish {:?} notification for schedule {} to {} recipients: {}",
                payload.change_type,
                payload.schedule_event_id,
                recipients.len(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    fn template(status: ScheduleStatus) -> ScheduleTemplate {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        ScheduleTemplate {
            id: 8,
            section_id: 21,
            title: "Compilers".to_string(),
            start,
            end: start + Duration::minutes(90),
            timezone: "Europe/Berlin".to_string(),
            location: Some("H1".to_string()),
            online_url: Some("https://meet.example.edu/compilers".to_string()),
            teacher_id: Some(4),
            status,
            recurrence_id: Some(2),
        }
    }

    #[test]
    fn test_snapshot_copies_mutable_fields() {
        let t = template(ScheduleStatus::Published);
        let snapshot = build_change_snapshot(&t, None);
        assert_eq!(snapshot.template_id, 8);
        assert_eq!(snapshot.start, t.start);
        assert_eq!(snapshot.end, t.end);
        assert_eq!(snapshot.location.as_deref(), Some("H1"));
        assert_eq!(snapshot.status, ScheduleStatus::Published);
    }

    #[test]
    fn test_snapshot_status_override_and_terminal_states() {
        let t = template(ScheduleStatus::Published);
        assert_eq!(
            build_change_snapshot(&t, Some(ScheduleStatus::Cancelled)).status,
            ScheduleStatus::Cancelled
        );

        for status in [ScheduleStatus::Archived, ScheduleStatus::Cancelled] {
            let snapshot = build_change_snapshot(&template(status), None);
            assert_eq!(snapshot.status, status);
        }
    }

    #[test]
    fn test_payload_field_names() {
        let before = build_change_snapshot(&template(ScheduleStatus::Published), None);
        let mut moved = template(ScheduleStatus::Rescheduled);
        moved.start += Duration::days(1);
        moved.end += Duration::days(1);
        let after = build_change_snapshot(&moved, None);

        let payload = build_notification_payload(
            &before,
            &after,
            ChangeType::Rescheduled,
            Some("conference"),
        );
        let json = serde_json::to_value(&payload).unwrap();

        for key in [
            "classSectionId",
            "scheduleEventId",
            "occurrenceDate",
            "fromStart",
            "fromEnd",
            "toStart",
            "toEnd",
            "reason",
            "changeType",
            "linkRoute",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["changeType"], "RESCHEDULED");
        assert_eq!(json["linkRoute"], "/sections/21/schedule");
        assert_eq!(payload.to_start, Some(moved.start));
    }

    #[test]
    fn test_link_route() {
        assert_eq!(link_route(21, None), "/sections/21/schedule");
        assert_eq!(
            link_route(21, NaiveDate::from_ymd_opt(2025, 1, 13)),
            "/sections/21/schedule?date=2025-01-13"
        );
    }

    #[test]
    fn test_change_type_for_status() {
        assert_eq!(
            ChangeType::for_status(ScheduleStatus::Cancelled),
            ChangeType::Cancelled
        );
        assert_eq!(
            ChangeType::for_status(ScheduleStatus::Archived),
            ChangeType::StatusChanged
        );
    }

    #[derive(Default)]
    struct VecLog(Mutex<Vec<ChangeLogEntry>>);

    #[async_trait]
    impl ChangeLogStore for VecLog {
        async fn append(&self, entry: ChangeLogEntry) -> Result<()> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl NotificationPublisher for FailingPublisher {
        async fn publish(&self, _: &[UserId], _: &NotificationPayload) -> Result<()> {
            Err(Error::Publish("broker unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_recorder_swallows_publish_failures() {
        let log = Arc::new(VecLog::default());
        let recorder = ChangeRecorder::new(log.clone(), Arc::new(FailingPublisher));

        let t = template(ScheduleStatus::Published);
        let before = build_change_snapshot(&t, None);
        let after = build_change_snapshot(&t, Some(ScheduleStatus::Cancelled));
        recorder
            .record(ChangeLogEntry::new(
                t.id,
                1,
                ChangeType::Cancelled,
                Some(before.clone()),
                Some(after.clone()),
                None,
            ))
            .await
            .unwrap();
        recorder
            .notify(
                &[30, 31],
                &build_notification_payload(&before, &after, ChangeType::Cancelled, None),
            )
            .await;

        let entries = log.0.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change_type, ChangeType::Cancelled);
        assert_eq!(
            entries[0].new_snapshot.as_ref().map(|s| s.status),
            Some(ScheduleStatus::Cancelled)
        );
    }
}
