use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tracked field where the lifetime aggregate disagrees with the sum of
/// its detail records. `percentage_diff` is `None` when the aggregate value
/// is zero (the ratio is undefined).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiscrepancy {
    pub field: String,
    pub aggregate_value: i64,
    pub detail_sum: i64,
    pub difference: i64,
    pub percentage_diff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub detail_sessions: usize,
    pub fields_checked: usize,
    pub fields_with_discrepancies: usize,
}

/// Per-player consistency report. `valid` iff every tracked field matches
/// exactly (integer equality, zero tolerance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub player_id: String,
    pub valid: bool,
    pub discrepancies: Vec<FieldDiscrepancy>,
    pub summary: ValidationSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_checked: usize,
    pub players_with_discrepancies: usize,
    pub total_discrepancies: usize,
    /// Only reports that found at least one discrepancy are retained.
    pub reports: Vec<DiscrepancyReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResult {
    pub player_id: String,
    pub fields_updated: usize,
    pub corrected_totals: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairFailure {
    pub player_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRepairResult {
    pub players_processed: usize,
    pub players_fixed: usize,
    pub errors: Vec<RepairFailure>,
}

/// Detail rows grouped by a dangling key (a player id with no aggregate row,
/// or a map id with no dimension row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanGroup {
    pub key: String,
    pub session_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrphanReport {
    pub orphaned_details: Vec<OrphanGroup>,
    pub unknown_map_details: Vec<OrphanGroup>,
    pub total_orphaned_sessions: i64,
    pub total_unknown_map_sessions: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub aggregates: i64,
    pub details: i64,
    pub maps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub table_counts: TableCounts,
    pub orphans: OrphanReport,
    pub sample_validation: BatchReport,
    /// Human-readable follow-ups; advisory only.
    pub advisories: Vec<String>,
}
