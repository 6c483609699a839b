//! Core domain model for orchestrator metric snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "omet-core";

/// Placeholder written for optional fields absent from a fetched record.
pub const MISSING_PLACEHOLDER: &str = "N/A";

/// One cell of a normalized metric row. The sink stores everything as text;
/// the numeric variants exist so comparison totals can be computed before
/// the value is rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Bool(_) | Scalar::Text(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

/// Flat column-to-value mapping. BTreeMap keeps column order deterministic
/// across polls, which the sink relies on when building statements.
pub type Row = BTreeMap<String, Scalar>;

/// A timestamped flat record of metric values captured from one poll.
/// Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub values: Row,
}

impl Snapshot {
    pub fn new(captured_at: DateTime<Utc>, values: Row) -> Self {
        Self {
            captured_at,
            values,
        }
    }

    /// Sum of the declared comparison keys, or `None` when any of them is
    /// missing or non-numeric.
    pub fn total_of(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().try_fold(0.0, |acc, key| {
            self.values.get(*key).and_then(Scalar::as_f64).map(|v| acc + v)
        })
    }
}

/// Per-family configuration for change-detected overview writes.
#[derive(Debug, Clone, Copy)]
pub struct FamilySpec {
    pub table: &'static str,
    pub baseline_key: &'static str,
    pub comparison_keys: &'static [&'static str],
}

/// Outcome of comparing a fresh snapshot against the family baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Totals match the baseline; nothing was written.
    Skip,
    /// Totals differ; the sink was rewritten and the baseline advanced.
    Replace,
    /// No usable baseline existed; the snapshot was written unconditionally.
    ReplaceInitial,
}
