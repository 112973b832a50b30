//! Core domain types for the herd scheduling system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Opaque identifiers for protocols, assignments and subjects
//! - Protocol templates and their day-offset steps
//! - Assignments with materialized, dated steps
//! - Read-only projections returned by schedule queries
//!
//! Field names serialize in camelCase so persisted documents keep the
//! backup schema (`dayOffset`, `hormoneName`, `injectionDate`, ...).

use crate::calendar::JalaliDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a protocol template (`proto_xxxxxxxx`)
    ProtocolId
);

string_id!(
    /// Identifier of an assignment (`asgn_xxxxxxxx`)
    AssignmentId
);

string_id!(
    /// Identifier of the animal a protocol is assigned to (ear tag number)
    SubjectId
);

/// Short random id with a prefix; callers retry on collision
pub(crate) fn generate_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &raw[..8])
}

impl ProtocolId {
    pub(crate) fn generate() -> Self {
        Self(generate_id("proto"))
    }
}

impl AssignmentId {
    pub(crate) fn generate() -> Self {
        Self(generate_id("asgn"))
    }
}

// ============================================================================
// Protocol Templates
// ============================================================================

/// One planned treatment, relative to the protocol start date
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Days after the start date (0 = start date, may be negative)
    pub day_offset: i32,
    pub hormone_name: String,
    pub dosage: String,
    /// Free text; empty when absent
    #[serde(default)]
    pub note: String,
}

/// A named, reusable treatment template.
///
/// Steps are unique by `day_offset` and kept sorted ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    /// Restored from the map key when absent in a stored document
    #[serde(default)]
    pub id: ProtocolId,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

// ============================================================================
// Assignments
// ============================================================================

/// A step materialized onto a concrete date
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledStep {
    pub day_offset: i32,
    pub hormone_name: String,
    pub dosage: String,
    #[serde(default)]
    pub note: String,
    /// `start_date + day_offset`, fixed at assignment time
    pub injection_date: JalaliDate,
    /// Only ever goes from false to true
    pub done: bool,
}

/// A protocol snapshot bound to one subject at one start date
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    /// Restored from the owning map key when absent in a stored document
    #[serde(default)]
    pub subject_id: SubjectId,
    pub protocol_id: ProtocolId,
    /// Name of the protocol when it was assigned
    pub protocol_name: String,
    pub start_date: JalaliDate,
    pub steps: Vec<ScheduledStep>,
}

// ============================================================================
// Query Projections
// ============================================================================

/// An undone scheduled step inside a query window
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueStep {
    pub subject_id: SubjectId,
    pub assignment_id: AssignmentId,
    pub protocol_name: String,
    pub day_offset: i32,
    pub hormone_name: String,
    pub dosage: String,
    pub note: String,
    pub injection_date: JalaliDate,
    /// `diff_days(reference, injection_date)`
    pub days_from_now: i64,
}

/// Due steps sharing the same hormone and dosage
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HormoneGroup {
    pub hormone_name: String,
    pub dosage: String,
    pub items: Vec<DueStep>,
}

/// Due steps on one date, grouped by hormone and dosage
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateGroup {
    pub date: JalaliDate,
    pub days_from_now: i64,
    pub groups: Vec<HormoneGroup>,
}
