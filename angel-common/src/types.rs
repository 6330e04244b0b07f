//! Data model for multi-source result synchronization
//!
//! Producers emit raw task results; the normalizer turns them into
//! [`StandardizedResult`]s, and fusion / conflict resolution produce
//! [`FusedRecord`]s. Both record shapes live in the central store as
//! [`StoreRecord`] and serialize losslessly for snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source confidence score (0.0-1.0)
pub type Confidence = f64;

/// Ordered payload mapping: field name to typed value
///
/// Payload keys are open-ended (not known in advance); a BTreeMap keeps
/// iteration deterministic so fusion output is stable for identical inputs.
pub type Payload = BTreeMap<String, FieldValue>;

/// A single payload field value
///
/// Discriminated so fusion functions can pattern-match exhaustively
/// instead of probing an untyped bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum FieldValue {
    /// Numeric measurement
    Number(f64),
    /// Free-form string (category label, status, identifier)
    Text(String),
    /// Nested time series
    Series(Vec<SeriesPoint>),
}

impl FieldValue {
    /// Numeric view of the value, if it is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text view of the value, if it is a string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Series view of the value, if it is a time series
    pub fn as_series(&self) -> Option<&[SeriesPoint]> {
        match self {
            FieldValue::Series(points) => Some(points.as_slice()),
            _ => None,
        }
    }
}

/// One timestamped point inside a `FieldValue::Series`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Free-form insight entry attached to a result
///
/// Category and theme are matched by exact string equality during insight
/// fusion; no canonicalization (case, synonyms) is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Grouping category (e.g. "growth")
    pub category: String,
    /// Theme text within the category
    pub theme: String,
    /// Confidence for this entry (0.0-1.0)
    pub confidence: Confidence,
}

/// Informational processing metadata carried on a result
///
/// Never affects correctness; used for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Producer-side processing duration in milliseconds
    pub processing_ms: Option<u64>,
    /// Originating task priority
    pub priority: Option<u32>,
    /// Retry count at the producer
    pub retry_count: u32,
}

/// Task identity carried by a raw producer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unit-of-work identifier
    pub id: String,
    /// Task category (groups results across sources)
    pub task_type: String,
}

/// Raw producer output, pre-normalization
///
/// `task` and `payload` are optional because producers are external and
/// untrusted; the normalizer rejects inputs missing either.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTaskResult {
    pub task: Option<TaskDescriptor>,
    pub payload: Option<Payload>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub metadata: ResultMetadata,
}

/// One normalized producer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedResult {
    /// Unique identifier (source type + task id + timestamp)
    pub id: String,
    /// Producing source identifier; open-ended, new types may appear at runtime
    pub source_type: String,
    /// Unit-of-work identifier
    pub task_id: String,
    /// Task category
    pub task_type: String,
    /// Ordered field mapping; may be empty, never absent
    pub payload: Payload,
    /// Free-form insight entries
    #[serde(default)]
    pub insights: Vec<Insight>,
    /// Derived confidence in [0, 1]
    pub confidence: Confidence,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Informational only
    #[serde(default)]
    pub metadata: ResultMetadata,
}

/// Kind discriminant for fused records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusedKind {
    FusedNumeric,
    FusedCategorical,
    FusedTimeSeries,
    FusedInsights,
    ResolvedConflict,
}

impl std::fmt::Display for FusedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FusedKind::FusedNumeric => "fused_numeric",
            FusedKind::FusedCategorical => "fused_categorical",
            FusedKind::FusedTimeSeries => "fused_time_series",
            FusedKind::FusedInsights => "fused_insights",
            FusedKind::ResolvedConflict => "resolved_conflict",
        };
        write!(f, "{}", name)
    }
}

/// Aggregate value carried by a fused record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum FusedValue {
    /// Numeric fusion summary
    Numeric(NumericSummary),
    /// Categorical fusion summary
    Categorical(CategoricalSummary),
    /// Merged time series, ascending by timestamp
    TimeSeries(Vec<FusedPoint>),
    /// Fused insight groups, one per category
    Insights(Vec<InsightGroup>),
    /// Single reconciled numeric value (conflict resolution)
    Scalar(f64),
    /// Single reconciled label (conflict resolution over strings)
    Label(String),
}

/// Statistics over the numeric values of one payload key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Number of contributing numeric values
    pub count: usize,
}

/// Weight distribution over the categorical values of one payload key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    /// Value with the highest accumulated confidence weight
    pub primary: String,
    /// Accumulated weight per candidate value
    pub distribution: BTreeMap<String, f64>,
}

/// One point of a fused time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedPoint {
    pub timestamp: DateTime<Utc>,
    /// Confidence-weighted average of contributing values
    pub value: f64,
    /// Minimum contributor confidence (conservative)
    pub confidence: Confidence,
}

/// One fused insight group (one per category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightGroup {
    pub category: String,
    /// Consensus weight per theme (summed entry confidences)
    pub themes: BTreeMap<String, f64>,
    /// Average confidence across entries in this category
    pub confidence: Confidence,
    /// Contributing source types, first-appearance order, deduped
    pub sources: Vec<String>,
}

/// Output of the fusion engine or conflict resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedRecord {
    pub kind: FusedKind,
    pub task_type: String,
    /// Payload field being summarized, when applicable
    pub data_key: Option<String>,
    pub value: FusedValue,
    /// Aggregate confidence in [0, 1]
    pub confidence: Confidence,
    /// Contributing source types; never empty
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Record stored in the central store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum StoreRecord {
    Standardized(StandardizedResult),
    Fused(FusedRecord),
}

impl StoreRecord {
    /// Task category of the record, whichever shape it is
    pub fn task_type(&self) -> &str {
        match self {
            StoreRecord::Standardized(r) => &r.task_type,
            StoreRecord::Fused(r) => &r.task_type,
        }
    }

    /// Aggregate or derived confidence of the record
    pub fn confidence(&self) -> Confidence {
        match self {
            StoreRecord::Standardized(r) => r.confidence,
            StoreRecord::Fused(r) => r.confidence,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            StoreRecord::Standardized(r) => r.timestamp,
            StoreRecord::Fused(r) => r.timestamp,
        }
    }
}
