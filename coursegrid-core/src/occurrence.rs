use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::{
    Occurrence, OccurrenceId, RecurrenceId, ScheduleEntry, ScheduleOverride, ScheduleTemplate,
    Visibility, overrides::resolve_overrides, range::DateRange, rule::parse_recurrence_rule,
};

/// Expands templates, applies overrides and returns occurrences sorted by start.
///
/// Pure: the same inputs always yield the same list. An empty or inverted
/// `range` yields no occurrences.
pub fn generate_occurrences(
    entries: &[ScheduleEntry],
    overrides: &[ScheduleOverride],
    range: DateRange,
    visibility: Visibility,
) -> Vec<Occurrence> {
    if range.is_empty() {
        return Vec::new();
    }

    let expanded: Vec<Occurrence> = entries
        .iter()
        .flat_map(|entry| expand_entry(entry, range))
        .collect();
    let generated = expanded.len();

    let mut occurrences = resolve_overrides(expanded, overrides, visibility);
    occurrences.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

    tracing::debug!(
        "generated {} occurrences from {} templates ({} after overrides) for {}..={}",
        generated,
        entries.len(),
        occurrences.len(),
        range.start,
        range.end
    );

    occurrences
}

/// Expands a single template into its occurrences inside `range`, in date order.
pub fn expand_entry(entry: &ScheduleEntry, range: DateRange) -> Vec<Occurrence> {
    let template = &entry.template;

    let Some(recurrence) = &entry.recurrence else {
        return if template.date_span().overlaps(&range) {
            vec![build_occurrence(
                template,
                None,
                template.start.date_naive(),
                template.start,
                template.end,
            )]
        } else {
            Vec::new()
        };
    };

    let rule = parse_recurrence_rule(&recurrence.rule);
    let series = DateRange::new(recurrence.start_date, recurrence.end_date).clamp_end(rule.until);
    let Some(window) = series.intersect(&range) else {
        return Vec::new();
    };

    let native = template.native_weekday();
    let time_of_day = template.start.time();
    let duration = template.duration();
    let interval = i64::from(rule.interval);

    window
        .days()
        .filter(|date| rule.matches_weekday(date.weekday(), native))
        .filter(|date| {
            // Week index counted from the series start, not the query window
            let week = (*date - recurrence.start_date).num_days().div_euclid(7);
            week.rem_euclid(interval) == 0
        })
        .map(|date| {
            let start = date.and_time(time_of_day).and_utc();
            build_occurrence(
                template,
                Some(recurrence.id),
                date,
                start,
                start + duration,
            )
        })
        .collect()
}

fn build_occurrence(
    template: &ScheduleTemplate,
    recurrence_id: Option<RecurrenceId>,
    date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Occurrence {
    Occurrence {
        id: OccurrenceId {
            template_id: template.id,
            date,
        },
        section_id: template.section_id,
        recurrence_id,
        title: template.title.clone(),
        date,
        start,
        end,
        timezone: template.timezone.clone(),
        location: template.location.clone(),
        online_url: template.online_url.clone(),
        teacher_id: template.teacher_id,
        status: template.status,
        is_override: false,
        reason: None,
    }
}
