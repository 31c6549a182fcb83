use std::{env, fs, sync::Arc};

use anyhow::{Context, Result};
use coursegrid_core::{
    DateRange, Occurrence, SectionId, TeacherId, Visibility, color_for,
    ics::{IcsExporter, IcsOptions},
    memory::{LogPublisher, MemoryStore},
    parse_recurrence_rule,
    service::ScheduleService,
    snapshot::ChangeRecorder,
};

/// Whose occurrences to list
pub enum Target {
    Sections(Vec<SectionId>),
    Teacher(TeacherId),
}

/// Occurrence listing parameters
pub struct ListParams {
    pub data: Option<String>,
    pub target: Target,
    pub start: String,
    pub end: String,
    pub include_cancelled: bool,
    pub format: String,
    pub output: Option<String>,
}

fn load_service(data: Option<String>) -> Result<ScheduleService> {
    let path = data
        .or_else(|| env::var("COURSEGRID_DATA").ok())
        .context("No dataset given: pass --data or set COURSEGRID_DATA")?;
    tracing::debug!("Loading schedule dataset from {}", path);

    let store = Arc::new(
        MemoryStore::from_path(&path)
            .with_context(|| format!("Failed to load schedule dataset {}", path))?,
    );
    let recorder = ChangeRecorder::new(store.clone(), Arc::new(LogPublisher));
    Ok(ScheduleService::new(store.clone(), store, recorder))
}

/// List occurrences for sections or a teacher
pub async fn occurrences_command(params: ListParams) -> Result<()> {
    let service = load_service(params.data)?;
    let range = DateRange::parse(&params.start, &params.end)?;
    let visibility = if params.include_cancelled {
        Visibility::IncludeCancelled
    } else {
        Visibility::Default
    };

    let (occurrences, calendar_name) = match params.target {
        Target::Sections(ids) => {
            tracing::info!("Listing occurrences for sections {:?}", ids);
            (
                service.section_occurrences(&ids, range, visibility).await?,
                "Class Schedule".to_string(),
            )
        }
        Target::Teacher(id) => {
            tracing::info!("Listing occurrences for teacher {}", id);
            (
                service.teacher_occurrences(id, range, visibility).await?,
                format!("Teaching Schedule {}", id),
            )
        }
    };

    let content = match params.format.as_str() {
        "json" => serde_json::to_string_pretty(&occurrences)?,
        "ics" => IcsExporter::new(IcsOptions {
            calendar_name: Some(calendar_name),
            ..Default::default()
        })
        .export(&occurrences),
        "table" => render_table(&occurrences),
        other => anyhow::bail!("Unknown format: {} (expected table, json or ics)", other),
    };

    match params.output {
        Some(path) => {
            fs::write(&path, content)?;
            println!("✓ {} occurrences written to {}", occurrences.len(), path);
        }
        None => print!("{}", content),
    }

    Ok(())
}

fn render_table(occurrences: &[Occurrence]) -> String {
    if occurrences.is_empty() {
        return "No occurrences in range\n".to_string();
    }

    let mut out = String::new();
    for occurrence in occurrences {
        let marker = if occurrence.is_override { "*" } else { " " };
        out.push_str(&format!(
            "{}{:<14} {}  {} - {}  {:<11} {:<30} {}\n",
            marker,
            occurrence.id.to_string(),
            occurrence.date,
            occurrence.start.format("%H:%M"),
            occurrence.end.format("%H:%M"),
            occurrence.status,
            occurrence.title,
            occurrence.location.as_deref().unwrap_or("-"),
        ));
    }
    out.push_str(&format!("{} occurrences\n", occurrences.len()));
    out
}

/// Registration-time conflict check
pub async fn conflict_command(
    data: Option<String>,
    student_id: i64,
    section_id: i64,
    semester_id: i64,
) -> Result<()> {
    let service = load_service(data)?;
    let conflict = service
        .conflict_detector()
        .find_conflict(student_id, section_id, semester_id)
        .await?;

    match conflict {
        Some(conflict) => {
            println!(
                "✗ Section {} conflicts with enrolled section {}",
                section_id, conflict.existing.section_id
            );
            println!(
                "  {} {} {} - {}",
                conflict.candidate.title,
                conflict.candidate.date,
                conflict.candidate.start.format("%H:%M"),
                conflict.candidate.end.format("%H:%M"),
            );
            println!(
                "  {} {} {} - {}",
                conflict.existing.title,
                conflict.existing.date,
                conflict.existing.start.format("%H:%M"),
                conflict.existing.end.format("%H:%M"),
            );
        }
        None => println!("✓ No conflict for student {} in section {}", student_id, section_id),
    }

    Ok(())
}

pub fn parse_rule_command(rule: &str) -> Result<()> {
    let parsed = parse_recurrence_rule(rule);
    println!("Normalized: {}", parsed);
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

pub fn color_command(id: i64) -> Result<()> {
    println!("{}", color_for(id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use coursegrid_core::{OccurrenceId, ScheduleStatus};

    fn occurrence() -> Occurrence {
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        Occurrence {
            id: OccurrenceId {
                template_id: 1,
                date,
            },
            section_id: 1,
            recurrence_id: Some(1),
            title: "Algebra".to_string(),
            date,
            start: Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap(),
            timezone: "UTC".to_string(),
            location: Some("Room 101".to_string()),
            online_url: None,
            teacher_id: Some(50),
            status: ScheduleStatus::Published,
            is_override: false,
            reason: None,
        }
    }

    #[test]
    fn test_render_table() {
        let table = render_table(&[occurrence()]);
        assert!(table.contains("1-20240108"));
        assert!(table.contains("09:00 - 10:00"));
        assert!(table.contains("Room 101"));
        assert!(table.ends_with("1 occurrences\n"));
    }

    #[test]
    fn test_render_empty_table() {
        assert_eq!(render_table(&[]), "No occurrences in range\n");
    }
}
