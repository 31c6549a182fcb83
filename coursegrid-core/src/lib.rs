//! Coursegrid Core Library
//!
//! Recurring class schedule engine: recurrence-rule parsing, bounded
//! occurrence expansion, per-date override merging and interval-overlap
//! conflict checking. The engine itself is pure; storage, audit logging and
//! notification delivery are collaborator traits.

pub mod conflict;
pub mod error;
pub mod ics;
pub mod memory;
pub mod occurrence;
pub mod overrides;
pub mod palette;
pub mod range;
pub mod repository;
pub mod rule;
pub mod service;
pub mod snapshot;
pub mod types;

// Re-export core types and error handling
pub use conflict::has_conflict;
pub use error::{Error, Result};
pub use occurrence::generate_occurrences;
pub use palette::color_for;
pub use range::DateRange;
pub use rule::{RecurrenceRule, parse_recurrence_rule};
pub use snapshot::{
    ChangeLogEntry, ChangeLogStore, ChangeType, NotificationPayload, NotificationPublisher,
    ScheduleSnapshot, build_change_snapshot,
};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        conflict::*, ics::*, memory::*, occurrence::*, overrides::*, palette::*, range::*,
        repository::*, rule::*, service::*, snapshot::*, types::*,
    };
}
