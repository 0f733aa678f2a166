//! Schedule model for Daywise.
//!
//! Holds the schedule types, the human time notation parser, the repair step
//! that turns untrusted model output into a `Schedule`, and the SQLite-backed
//! document store.

pub mod repair;
pub mod store;
pub mod time_range;
pub mod types;

pub use repair::{repair_schedule, RepairError};
pub use store::{ScheduleStore, SqliteScheduleStore, StoreError, StoreResult};
pub use time_range::{
    parse_time_range, parse_time_range_in, TimeParseError, TimeRange, DEFAULT_DURATION_MINUTES,
};
pub use types::{Schedule, ScheduleDocument, ScheduleEntry};
