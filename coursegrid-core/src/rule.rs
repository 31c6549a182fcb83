use std::{collections::BTreeSet, convert::Infallible, fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// Parsed weekly recurrence rule
///
/// An empty `by_day` set means "the template's own weekday".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// Repeat every N weeks, always >= 1
    pub interval: u32,
    /// Last date (inclusive) the series may produce
    pub until: Option<NaiveDate>,
    /// Weekdays producing occurrences, Monday first
    pub by_day: BTreeSet<DayCode>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            interval: 1,
            until: None,
            by_day: BTreeSet::new(),
        }
    }
}

impl RecurrenceRule {
    /// Whether `weekday` produces occurrences, falling back to `native` when BYDAY is empty.
    pub fn matches_weekday(&self, weekday: Weekday, native: Weekday) -> bool {
        if self.by_day.is_empty() {
            weekday == native
        } else {
            self.by_day.contains(&DayCode::from(weekday))
        }
    }
}

/// Parses a `KEY=VALUE;KEY=VALUE` rule string.
///
/// Lenient by contract: unknown keys, malformed values and unknown day codes
/// are skipped, so this never fails.
pub fn parse_recurrence_rule(rule: &str) -> RecurrenceRule {
    let mut parsed = RecurrenceRule::default();

    for segment in rule.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_uppercase().as_str() {
            "INTERVAL" => {
                if let Ok(interval) = value.parse::<u32>() {
                    if interval > 0 {
                        parsed.interval = interval;
                    }
                }
            }
            "UNTIL" => {
                if let Some(until) = parse_until(value) {
                    parsed.until = Some(until);
                }
            }
            "BYDAY" => {
                parsed.by_day.extend(value.split(',').filter_map(DayCode::parse));
            }
            _ => {}
        }
    }

    parsed
}

fn parse_until(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

impl FromStr for RecurrenceRule {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_recurrence_rule(s))
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INTERVAL={}", self.interval)?;
        if !self.by_day.is_empty() {
            let days: Vec<&str> = self.by_day.iter().map(|day| day.as_str()).collect();
            write!(f, ";BYDAY={}", days.join(","))?;
        }
        if let Some(until) = self.until {
            write!(f, ";UNTIL={}", until.format("%Y%m%d"))?;
        }
        Ok(())
    }
}

/// Two-letter BYDAY code
///
/// Ordered Monday first, unlike [`Weekday`] which has no `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayCode {
    #[serde(rename = "MO")]
    Mo,
    #[serde(rename = "TU")]
    Tu,
    #[serde(rename = "WE")]
    We,
    #[serde(rename = "TH")]
    Th,
    #[serde(rename = "FR")]
    Fr,
    #[serde(rename = "SA")]
    Sa,
    #[serde(rename = "SU")]
    Su,
}

impl DayCode {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "MO" => Some(Self::Mo),
            "TU" => Some(Self::Tu),
            "WE" => Some(Self::We),
            "TH" => Some(Self::Th),
            "FR" => Some(Self::Fr),
            "SA" => Some(Self::Sa),
            "SU" => Some(Self::Su),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mo => "MO",
            Self::Tu => "TU",
            Self::We => "WE",
            Self::Th => "TH",
            Self::Fr => "FR",
            Self::Sa => "SA",
            Self::Su => "SU",
        }
    }
}

impl From<Weekday> for DayCode {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mo,
            Weekday::Tue => Self::Tu,
            Weekday::Wed => Self::We,
            Weekday::Thu => Self::Th,
            Weekday::Fri => Self::Fr,
            Weekday::Sat => Self::Sa,
            Weekday::Sun => Self::Su,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rule() {
        let rule = parse_recurrence_rule("INTERVAL=2;BYDAY=MO,WE;UNTIL=20250601");
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.by_day, BTreeSet::from([DayCode::Mo, DayCode::We]));
        assert_eq!(rule.until, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn test_empty_rule_is_default() {
        let rule = parse_recurrence_rule("");
        assert_eq!(rule, RecurrenceRule::default());
        assert_eq!(rule.interval, 1);
        assert!(rule.by_day.is_empty());
        assert_eq!(rule.until, None);
    }

    #[test]
    fn test_malformed_segments_are_skipped() {
        let rule = parse_recurrence_rule(
            "FREQ=WEEKLY;INTERVAL=abc;UNTIL=June;BYDAY=MO,XX,fr,;garbage;COUNT=3",
        );
        assert_eq!(rule.interval, 1);
        assert_eq!(rule.until, None);
        assert_eq!(rule.by_day, BTreeSet::from([DayCode::Mo, DayCode::Fr]));
    }

    #[test]
    fn test_zero_interval_keeps_default() {
        assert_eq!(parse_recurrence_rule("INTERVAL=0").interval, 1);
        assert_eq!(parse_recurrence_rule("INTERVAL=-2").interval, 1);
    }

    #[test]
    fn test_until_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 1);
        assert_eq!(parse_recurrence_rule("UNTIL=20250601T235959Z").until, expected);
        assert_eq!(parse_recurrence_rule("UNTIL=20250601T000000").until, expected);
        assert_eq!(parse_recurrence_rule("until=2025-06-01").until, expected);
    }

    #[test]
    fn test_native_weekday_fallback() {
        let rule = RecurrenceRule::default();
        assert!(rule.matches_weekday(Weekday::Tue, Weekday::Tue));
        assert!(!rule.matches_weekday(Weekday::Wed, Weekday::Tue));

        let rule = parse_recurrence_rule("BYDAY=WE");
        assert!(rule.matches_weekday(Weekday::Wed, Weekday::Tue));
        assert!(!rule.matches_weekday(Weekday::Tue, Weekday::Tue));
    }

    #[test]
    fn test_display_is_reparseable() {
        let rule: RecurrenceRule = "BYDAY=WE,MO;INTERVAL=3;UNTIL=20250301".parse().unwrap();
        assert_eq!(rule.to_string(), "INTERVAL=3;BYDAY=MO,WE;UNTIL=20250301");
        assert_eq!(parse_recurrence_rule(&rule.to_string()), rule);
    }
}
