use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Occurrence, ScheduleStatus, palette::color_for};


/// ICS export options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcsOptions {
    /// Calendar name
    pub calendar_name: Option<String>,
    /// Display timezone label (X-WR-TIMEZONE); instants stay in UTC
    pub timezone: Option<String>,
    pub include_description: bool,
    pub reminder_minutes: Option<u32>,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            calendar_name: Some("Class Schedule".to_string()),
            timezone: None,
            include_description: true,
            reminder_minutes: Some(15),
        }
    }
}

/// Renders resolved occurrences as an iCalendar document
pub struct IcsExporter {
    options: IcsOptions,
}

impl IcsExporter {
    pub fn new(options: IcsOptions) -> Self {
        Self { options }
    }

    /// Exports with the current time as DTSTAMP.
    pub fn export(&self, occurrences: &[Occurrence]) -> String {
        self.export_at(occurrences, Utc::now())
    }

    pub fn export_at(&self, occurrences: &[Occurrence], stamp: DateTime<Utc>) -> String {
        let mut ics_content = String::new();

        ics_content.push_str("BEGIN:VCALENDAR\r\n");
        ics_content.push_str("VERSION:2.0\r\n");
        ics_content.push_str("PRODID:-//Coursegrid//Class Schedule//EN\r\n");
        ics_content.push_str("CALSCALE:GREGORIAN\r\n");
        ics_content.push_str("METHOD:PUBLISH\r\n");

        if let Some(ref name) = self.options.calendar_name {
            ics_content.push_str(&format!("X-WR-CALNAME:{}\r\n", escape_text(name)));
        }

        if let Some(ref timezone) = self.options.timezone {
            ics_content.push_str(&format!("X-WR-TIMEZONE:{}\r\n", timezone));
        }

        for occurrence in occurrences {
            self.add_occurrence_event(&mut ics_content, occurrence, stamp);
        }

        ics_content.push_str("END:VCALENDAR\r\n");
        ics_content
    }

    fn add_occurrence_event(
        &self,
        ics_content: &mut String,
        occurrence: &Occurrence,
        stamp: DateTime<Utc>,
    ) {
        ics_content.push_str("BEGIN:VEVENT\r\n");
        ics_content.push_str(&format!("UID:{}@coursegrid\r\n", occurrence.id));
        ics_content.push_str(&format!("DTSTAMP:{}\r\n", format_instant(stamp)));
        ics_content.push_str(&format!("DTSTART:{}\r\n", format_instant(occurrence.start)));
        ics_content.push_str(&format!("DTEND:{}\r\n", format_instant(occurrence.end)));
        ics_content.push_str(&format!(
            "SUMMARY:{}\r\n",
            escape_text(&build_title(occurrence))
        ));

        if let Some(ref location) = occurrence.location {
            ics_content.push_str(&format!("LOCATION:{}\r\n", escape_text(location)));
        }
        if let Some(ref url) = occurrence.online_url {
            ics_content.push_str(&format!("URL:{}\r\n", url));
        }

        if self.options.include_description {
            ics_content.push_str(&format!(
                "DESCRIPTION:{}\r\n",
                escape_text(&build_description(occurrence))
            ));
        }

        let status = match occurrence.status {
            ScheduleStatus::Cancelled => "CANCELLED",
            ScheduleStatus::Draft => "TENTATIVE",
            ScheduleStatus::Published
            | ScheduleStatus::Rescheduled
            | ScheduleStatus::Completed
            | ScheduleStatus::Archived => "CONFIRMED",
        };
        ics_content.push_str(&format!("STATUS:{}\r\n", status));
        ics_content.push_str(&format!("COLOR:{}\r\n", color_for(occurrence.section_id)));

        if let Some(reminder_minutes) = self.options.reminder_minutes {
            if occurrence.status != ScheduleStatus::Cancelled {
                ics_content.push_str("BEGIN:VALARM\r\n");
                ics_content.push_str("ACTION:DISPLAY\r\n");
                ics_content.push_str("DESCRIPTION:Class reminder\r\n");
                ics_content.push_str(&format!("TRIGGER:-PT{}M\r\n", reminder_minutes));
                ics_content.push_str("END:VALARM\r\n");
            }
        }

        ics_content.push_str("END:VEVENT\r\n");
    }
}

impl Default for IcsExporter {
    fn default() -> Self {
        Self::new(IcsOptions::default())
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escapes ICS text values
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// Event title: `[Cancelled] Title` / `[Rescheduled] Title` / `Title`
pub fn build_title(occurrence: &Occurrence) -> String {
    match occurrence.status {
        ScheduleStatus::Cancelled => format!("[Cancelled] {}", occurrence.title),
        ScheduleStatus::Rescheduled if occurrence.is_override => {
            format!("[Rescheduled] {}", occurrence.title)
        }
        _ => occurrence.title.clone(),
    }
}

pub fn build_description(occurrence: &Occurrence) -> String {
    let mut description = format!(
        "Section {} session on {} ({})",
        occurrence.section_id,
        occurrence.id.date.format("%Y-%m-%d"),
        occurrence.timezone
    );
    if occurrence.is_override && occurrence.start.date_naive() != occurrence.id.date {
        description.push_str(&format!(
            ", moved to {}",
            occurrence.start.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    if let Some(ref reason) = occurrence.reason {
        description.push_str(&format!(". Reason: {}", reason));
    }
    description
}
