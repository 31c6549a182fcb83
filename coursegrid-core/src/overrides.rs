use std::collections::HashMap;

use chrono::NaiveDate;

use crate::{
    Occurrence, OverrideKind, RecurrenceId, ScheduleOverride, ScheduleStatus, Visibility,
};

/// Overrides indexed by `(recurrence id, original date)`
///
/// When the input holds two overrides for the same key, the later one wins.
#[derive(Debug, Default)]
pub struct OverrideIndex<'a> {
    by_key: HashMap<(RecurrenceId, NaiveDate), &'a ScheduleOverride>,
}

impl<'a> OverrideIndex<'a> {
    pub fn new(overrides: &'a [ScheduleOverride]) -> Self {
        let by_key = overrides
            .iter()
            .map(|o| ((o.recurrence_id, o.original_date), o))
            .collect();
        Self { by_key }
    }

    pub fn get(
        &self,
        recurrence_id: RecurrenceId,
        date: NaiveDate,
    ) -> Option<&'a ScheduleOverride> {
        self.by_key.get(&(recurrence_id, date)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Merges per-date exceptions onto generated occurrences.
///
/// Identity (template id + date) is never touched; only presentation fields
/// change. Overrides whose recurrence produced no occurrence are ignored.
pub fn resolve_overrides(
    occurrences: Vec<Occurrence>,
    overrides: &[ScheduleOverride],
    visibility: Visibility,
) -> Vec<Occurrence> {
    if overrides.is_empty() {
        return occurrences;
    }

    let index = OverrideIndex::new(overrides);
    occurrences
        .into_iter()
        .filter_map(|occurrence| {
            let matched = occurrence
                .recurrence_id
                .and_then(|recurrence_id| index.get(recurrence_id, occurrence.date));
            match matched {
                None => Some(occurrence),
                Some(exception) => apply_override(occurrence, exception, visibility),
            }
        })
        .collect()
}

/// Applies one override; `None` means the occurrence is hidden.
pub fn apply_override(
    mut occurrence: Occurrence,
    exception: &ScheduleOverride,
    visibility: Visibility,
) -> Option<Occurrence> {
    match (exception.kind, visibility) {
        (OverrideKind::Cancel, Visibility::Default) => None,
        (OverrideKind::Cancel, Visibility::IncludeCancelled) => {
            occurrence.status = ScheduleStatus::Cancelled;
            occurrence.is_override = true;
            occurrence.reason.clone_from(&exception.reason);
            Some(occurrence)
        }
        (OverrideKind::Reschedule, _) => {
            // A missing new end keeps the original end, and vice versa
            if let Some(start) = exception.new_start {
                occurrence.start = start;
            }
            if let Some(end) = exception.new_end {
                occurrence.end = end;
            }
            if let Some(location) = &exception.new_location {
                occurrence.location = Some(location.clone());
            }
            if let Some(teacher_id) = exception.new_teacher_id {
                occurrence.teacher_id = Some(teacher_id);
            }
            occurrence.status = ScheduleStatus::Rescheduled;
            occurrence.is_override = true;
            occurrence.reason.clone_from(&exception.reason);
            Some(occurrence)
        }
    }
}
