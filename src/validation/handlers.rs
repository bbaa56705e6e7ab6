use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::shared::{AppError, AppState};

use super::models::{
    BatchRepairResult, BatchReport, DiscrepancyReport, HealthReport, OrphanReport, RepairResult,
};

const DEFAULT_BATCH_LIMIT: usize = 100;

/// Confirmation phrase required by the bulk recalculation endpoint.
const RECALCULATE_CONFIRMATION: &str = "RECALCULATE_ALL_USERS";

/// GET /api/validation/user/:player_id
#[instrument(name = "validate_user", skip(state))]
pub async fn validate_user(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<DiscrepancyReport>, AppError> {
    let report = state.validation.validate_user(&player_id).await?;
    if !report.valid {
        info!(
            player_id,
            discrepancies = report.discrepancies.len(),
            "aggregate record has drifted from detail records"
        );
    }
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub limit: Option<usize>,
}

/// GET /api/validation/batch?limit=
#[instrument(name = "validate_batch", skip(state))]
pub async fn validate_batch(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<BatchReport>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    let report = state.validation.validate_batch(limit).await?;
    info!(
        checked = report.total_checked,
        discrepant = report.players_with_discrepancies,
        "batch validation finished"
    );
    Ok(Json(report))
}

/// POST /api/validation/fix/:player_id
#[instrument(name = "fix_user", skip(state))]
pub async fn fix_user(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<RepairResult>, AppError> {
    let result = state.validation.fix_user(&player_id).await?;
    info!(
        player_id,
        fields_updated = result.fields_updated,
        "aggregate record repaired"
    );
    Ok(Json(result))
}

#[derive(Debug, Deserialize, Default)]
pub struct RecalculateRequest {
    #[serde(default)]
    pub confirm: String,
}

/// POST /api/validation/recalculate/all
///
/// Repairs every discrepant player in a bounded batch. Destructive enough to
/// require an explicit confirmation phrase in the body.
#[instrument(name = "recalculate_all", skip(state, request))]
pub async fn recalculate_all(
    State(state): State<AppState>,
    Json(request): Json<RecalculateRequest>,
) -> Result<Json<BatchRepairResult>, AppError> {
    if request.confirm != RECALCULATE_CONFIRMATION {
        return Err(AppError::InvalidArgument(format!(
            "bulk recalculation requires confirm == \"{RECALCULATE_CONFIRMATION}\""
        )));
    }

    let result = state.validation.fix_all_discrepant(50).await?;
    if !result.errors.is_empty() {
        warn!(
            failed = result.errors.len(),
            "some players could not be repaired"
        );
    }
    info!(
        processed = result.players_processed,
        fixed = result.players_fixed,
        "bulk recalculation finished"
    );
    Ok(Json(result))
}

/// GET /api/validation/orphaned
#[instrument(name = "check_orphans", skip(state))]
pub async fn check_orphans(
    State(state): State<AppState>,
) -> Result<Json<OrphanReport>, AppError> {
    Ok(Json(state.validation.check_orphans().await?))
}

/// GET /api/validation/health
#[instrument(name = "health_report", skip(state))]
pub async fn health_report(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, AppError> {
    Ok(Json(state.validation.health_report().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::models::{RecordScope, StatRecord};
    use crate::shared::test_utils::AppStateBuilder;
    use crate::validation::repository::InMemoryStatsRepository;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn router(repo: Arc<InMemoryStatsRepository>) -> Router {
        Router::new()
            .route("/api/validation/user/:player_id", get(validate_user))
            .route("/api/validation/batch", get(validate_batch))
            .route("/api/validation/fix/:player_id", post(fix_user))
            .route("/api/validation/recalculate/all", post(recalculate_all))
            .route("/api/validation/orphaned", get(check_orphans))
            .with_state(AppStateBuilder::new().with_repository(repo).build())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn drifted_repo() -> Arc<InMemoryStatsRepository> {
        let repo = Arc::new(InMemoryStatsRepository::new());
        repo.insert_aggregate(
            StatRecord::new("p1", RecordScope::Lifetime).with_counter("common_kills", 50.0),
        )
        .await;
        repo.insert_detail(
            StatRecord::new("p1", RecordScope::Map("c1m1".into()))
                .with_counter("common_kills", 45.0),
        )
        .await;
        repo
    }

    #[tokio::test]
    async fn validate_user_reports_discrepancies() {
        let app = router(drifted_repo().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/validation/user/p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report: DiscrepancyReport = body_json(response).await;
        assert!(!report.valid);
        assert_eq!(report.discrepancies[0].difference, 5);
    }

    #[tokio::test]
    async fn unknown_player_maps_to_404_envelope() {
        let app = router(Arc::new(InMemoryStatsRepository::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/validation/user/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let envelope: serde_json::Value = body_json(response).await;
        assert_eq!(envelope["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn oversized_batch_limit_is_rejected() {
        let app = router(Arc::new(InMemoryStatsRepository::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/validation/batch?limit=5000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let envelope: serde_json::Value = body_json(response).await;
        assert_eq!(envelope["error"]["kind"], "invalid_argument");
    }

    #[tokio::test]
    async fn fix_endpoint_repairs_and_reports_totals() {
        let app = router(drifted_repo().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/validation/fix/p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let result: RepairResult = body_json(response).await;
        assert_eq!(result.corrected_totals["common_kills"], 45);
    }

    #[tokio::test]
    async fn recalculate_all_requires_confirmation_phrase() {
        let app = router(drifted_repo().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/validation/recalculate/all")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"confirm": "yes please"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recalculate_all_fixes_discrepant_players() {
        let app = router(drifted_repo().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/validation/recalculate/all")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"confirm": "RECALCULATE_ALL_USERS"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let result: BatchRepairResult = body_json(response).await;
        assert_eq!(result.players_processed, 1);
        assert_eq!(result.players_fixed, 1);
    }
}
