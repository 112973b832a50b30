#![forbid(unsafe_code)]

//! Core domain model and business logic for the Herd treatment scheduler.
//!
//! This crate provides:
//! - Jalali/Gregorian calendar conversion and day arithmetic
//! - Protocol templates (ProtocolStore)
//! - Dated per-animal schedules (AssignmentEngine)
//! - "What is due" queries and grouping
//! - Persistence of the backup-compatible state document

pub mod types;
pub mod error;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod assignment;
pub mod schedule;
pub mod state;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use calendar::JalaliDate;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use protocol::ProtocolStore;
pub use assignment::AssignmentEngine;
pub use schedule::{
    due_today, group_by_date_then_hormone, group_by_hormone_dosage, upcoming_injections,
};
pub use state::HerdState;
