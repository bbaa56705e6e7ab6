use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{info, warn};

use crate::scoring::models::StatRecord;
use crate::shared::AppError;

use super::models::{
    BatchRepairResult, BatchReport, DiscrepancyReport, FieldDiscrepancy, HealthReport,
    OrphanReport, RepairFailure, RepairResult, ValidationSummary,
};
use super::repository::StatsRepository;

/// Hard cap on batch scans; larger requests are rejected up front.
pub const MAX_BATCH_LIMIT: usize = 1000;

/// Batch size used by the health report's sample validation.
const HEALTH_SAMPLE_LIMIT: usize = 50;

/// The aggregate columns reconciled against detail sums.
pub fn default_tracked_fields() -> Vec<String> {
    [
        "common_kills",
        "special_kills",
        "survivor_ff",
        "survivor_ff_rec",
        "heal_others",
        "revived_others",
        "defibs_used",
        "damage_to_tank",
        "witch_kills",
        "witches_crowned",
        "finales_won",
        "minutes_played",
        "survivor_deaths",
        "tanks_killed",
        "tanks_killed_solo",
        "tanks_killed_melee",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Sums each tracked field across the detail records. Missing and non-numeric
/// values contribute zero.
pub fn sum_tracked_fields(details: &[StatRecord], fields: &[String]) -> BTreeMap<String, i64> {
    fields
        .iter()
        .map(|field| {
            let total: i64 = details
                .iter()
                .map(|record| record.counter_as_int(field))
                .sum();
            (field.clone(), total)
        })
        .collect()
}

/// Pure field-by-field comparison of an aggregate against its detail sums.
/// Integer equality, zero tolerance.
pub fn compare_totals(
    aggregate: &StatRecord,
    details: &[StatRecord],
    fields: &[String],
) -> DiscrepancyReport {
    let detail_sums = sum_tracked_fields(details, fields);

    let mut discrepancies = Vec::new();
    for field in fields {
        let aggregate_value = aggregate.counter_as_int(field);
        let detail_sum = detail_sums.get(field).copied().unwrap_or(0);
        if aggregate_value == detail_sum {
            continue;
        }

        let difference = aggregate_value - detail_sum;
        let percentage_diff = if aggregate_value != 0 {
            let raw = difference as f64 / aggregate_value as f64 * 100.0;
            Some((raw * 100.0).round() / 100.0)
        } else {
            None
        };

        discrepancies.push(FieldDiscrepancy {
            field: field.clone(),
            aggregate_value,
            detail_sum,
            difference,
            percentage_diff,
        });
    }

    DiscrepancyReport {
        player_id: aggregate.player_id.clone(),
        valid: discrepancies.is_empty(),
        summary: ValidationSummary {
            detail_sessions: details.len(),
            fields_checked: fields.len(),
            fields_with_discrepancies: discrepancies.len(),
        },
        discrepancies,
    }
}

/// Consistency validator and reconciliation service over a storage
/// collaborator. Validation is read-only; repair is the one operation with
/// side effects and is serialized per player.
pub struct ValidationService {
    repository: Arc<dyn StatsRepository>,
    tracked_fields: Vec<String>,
    player_locks: RwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ValidationService {
    pub fn new(repository: Arc<dyn StatsRepository>) -> Self {
        Self {
            repository,
            tracked_fields: default_tracked_fields(),
            player_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_tracked_fields(mut self, fields: Vec<String>) -> Self {
        self.tracked_fields = fields;
        self
    }

    pub fn tracked_fields(&self) -> &[String] {
        &self.tracked_fields
    }

    pub async fn validate_user(&self, player_id: &str) -> Result<DiscrepancyReport, AppError> {
        let aggregate = self
            .repository
            .get_aggregate(player_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no aggregate record for player {player_id}"))
            })?;
        let details = self.repository.get_details(player_id).await?;

        Ok(compare_totals(&aggregate, &details, &self.tracked_fields))
    }

    pub async fn validate_batch(&self, limit: usize) -> Result<BatchReport, AppError> {
        if limit == 0 {
            return Err(AppError::InvalidArgument(
                "batch limit must be at least 1".to_string(),
            ));
        }
        if limit > MAX_BATCH_LIMIT {
            return Err(AppError::InvalidArgument(format!(
                "batch limit {limit} exceeds maximum of {MAX_BATCH_LIMIT}"
            )));
        }

        let players = self.repository.list_players(limit).await?;
        let mut report = BatchReport {
            total_checked: players.len(),
            ..BatchReport::default()
        };

        for player_id in players {
            let validation = match self.validate_user(&player_id).await {
                Ok(validation) => validation,
                Err(err) => {
                    // One broken player must not abort the batch.
                    warn!(player_id, %err, "skipping player during batch validation");
                    continue;
                }
            };

            if !validation.valid {
                report.players_with_discrepancies += 1;
                report.total_discrepancies += validation.discrepancies.len();
                report.reports.push(validation);
            }
        }

        Ok(report)
    }

    /// Recomputes the aggregate's tracked fields from its detail records and
    /// overwrites them in one atomic write. Pure function of the detail set,
    /// so repeated repairs with unchanged details are idempotent.
    pub async fn fix_user(&self, player_id: &str) -> Result<RepairResult, AppError> {
        let lock = self.player_lock(player_id).await;
        let _guard = lock.lock().await;

        let aggregate = self
            .repository
            .get_aggregate(player_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no aggregate record for player {player_id}"))
            })?;
        let details = self.repository.get_details(&aggregate.player_id).await?;

        let corrected_totals = sum_tracked_fields(&details, &self.tracked_fields);
        self.repository
            .write_aggregate(player_id, &corrected_totals)
            .await?;

        info!(
            player_id,
            fields = corrected_totals.len(),
            "aggregate record reconciled from detail records"
        );

        Ok(RepairResult {
            player_id: player_id.to_string(),
            fields_updated: corrected_totals.len(),
            corrected_totals,
        })
    }

    /// Validates a batch, then repairs every discrepant player. Individual
    /// failures are collected rather than aborting the batch.
    pub async fn fix_all_discrepant(&self, limit: usize) -> Result<BatchRepairResult, AppError> {
        let validation = self.validate_batch(limit).await?;

        let mut result = BatchRepairResult::default();
        for report in validation.reports {
            result.players_processed += 1;
            match self.fix_user(&report.player_id).await {
                Ok(_) => result.players_fixed += 1,
                Err(err) => {
                    warn!(player_id = %report.player_id, %err, "repair failed");
                    result.errors.push(RepairFailure {
                        player_id: report.player_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    pub async fn check_orphans(&self) -> Result<OrphanReport, AppError> {
        let orphaned_details = self.repository.orphaned_details().await?;
        let unknown_map_details = self.repository.unknown_map_details().await?;

        let total_orphaned_sessions = orphaned_details.iter().map(|g| g.session_count).sum();
        let total_unknown_map_sessions =
            unknown_map_details.iter().map(|g| g.session_count).sum();

        Ok(OrphanReport {
            orphaned_details,
            unknown_map_details,
            total_orphaned_sessions,
            total_unknown_map_sessions,
        })
    }

    pub async fn health_report(&self) -> Result<HealthReport, AppError> {
        let table_counts = self.repository.table_counts().await?;
        let orphans = self.check_orphans().await?;
        let sample_limit = HEALTH_SAMPLE_LIMIT.min(MAX_BATCH_LIMIT);
        let sample_validation = match self.validate_batch(sample_limit).await {
            Ok(batch) => batch,
            Err(AppError::InvalidArgument(_)) => BatchReport::default(),
            Err(err) => return Err(err),
        };

        let mut advisories = Vec::new();
        if orphans.total_orphaned_sessions > 0 {
            advisories.push(format!(
                "{} map sessions have no matching aggregate record",
                orphans.total_orphaned_sessions
            ));
        }
        if orphans.total_unknown_map_sessions > 0 {
            advisories.push(format!(
                "{} map sessions reference unknown maps",
                orphans.total_unknown_map_sessions
            ));
        }
        if sample_validation.players_with_discrepancies > 0 {
            advisories.push(format!(
                "{} players have aggregate/detail discrepancies",
                sample_validation.players_with_discrepancies
            ));
        }
        if advisories.is_empty() {
            advisories.push("no data integrity issues detected".to_string());
        }

        Ok(HealthReport {
            timestamp: Utc::now(),
            table_counts,
            orphans,
            sample_validation,
            advisories,
        })
    }

    /// Per-player lock so concurrent repairs of the same player serialize;
    /// repairs of different players stay independent.
    async fn player_lock(&self, player_id: &str) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.player_locks.read().await;
            if let Some(lock) = guard.get(player_id) {
                return lock.clone();
            }
        }

        let mut guard = self.player_locks.write().await;
        guard
            .entry(player_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
