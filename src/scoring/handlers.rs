use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::shared::{AppError, AppState};

use super::calculator::calculate;
use super::models::{RankingMode, RankingResult, RecordScope, ScoreBreakdown, StatRecord};
use super::mvp::rank;
use super::rules::MvpCriterion;

/// Ruleset metadata surfaced to clients; `version` and `last_updated` are
/// echoed verbatim from the loaded document.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub version: String,
    pub last_updated: String,
    pub round_final_score: bool,
    pub base_rules: usize,
    pub penalty_rules: usize,
    pub multiplier_rules: usize,
    pub bonus_rules: usize,
    pub mvp_criteria: Vec<MvpCriterion>,
}

/// GET /api/points/config
#[instrument(name = "get_config", skip(state))]
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let rules = state.rules.current();
    Json(ConfigResponse {
        version: rules.version.clone(),
        last_updated: rules.last_updated.clone(),
        round_final_score: rules.round_final_score,
        base_rules: rules.base_rules.len(),
        penalty_rules: rules.penalty_rules.len(),
        multiplier_rules: rules.multiplier_rules.len(),
        bonus_rules: rules.bonus_rules.len(),
        mvp_criteria: rules.mvp_criteria.clone(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub version: String,
}

/// POST /api/points/reload
#[instrument(name = "reload_config", skip(state))]
pub async fn reload_config(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, AppError> {
    let rules = state.rules.reload()?;
    info!(version = %rules.version, "ruleset reloaded via API");
    Ok(Json(ReloadResponse {
        version: rules.version.clone(),
    }))
}

/// POST /api/points/session
///
/// Scores a posted session record against the current ruleset.
#[instrument(name = "session_points", skip(state, record))]
pub async fn session_points(
    State(state): State<AppState>,
    Json(mut record): Json<StatRecord>,
) -> Json<ScoreBreakdown> {
    if record.scope == RecordScope::Lifetime {
        record.scope = RecordScope::Session(String::new());
    }
    record.ensure_special_kills();
    Json(calculate(&record, &state.rules.current()))
}

/// POST /api/points/map
#[instrument(name = "map_points", skip(state, record))]
pub async fn map_points(
    State(state): State<AppState>,
    Json(mut record): Json<StatRecord>,
) -> Json<ScoreBreakdown> {
    if record.scope == RecordScope::Lifetime {
        record.scope = RecordScope::Map(String::new());
    }
    record.ensure_special_kills();
    Json(calculate(&record, &state.rules.current()))
}

#[derive(Debug, Deserialize)]
pub struct MvpQuery {
    pub mode: Option<RankingMode>,
}

/// POST /api/points/mvp?mode=criteria|score
///
/// Ranks the posted records (one per player, same scope) and marks the MVP.
#[instrument(name = "calculate_mvp", skip(state, records))]
pub async fn calculate_mvp(
    State(state): State<AppState>,
    Query(query): Query<MvpQuery>,
    Json(mut records): Json<Vec<StatRecord>>,
) -> Json<RankingResult> {
    let mode = query.mode.unwrap_or(RankingMode::Score);
    for record in &mut records {
        record.ensure_special_kills();
    }
    info!(players = records.len(), %mode, "ranking MVP");
    Json(rank(&records, &state.rules.current(), mode))
}
