mod scoring;
mod shared;
mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use scoring::rules::RuleSetHandle;
use shared::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validation::repository::InMemoryStatsRepository;
// use validation::repository::PostgresStatsRepository; // For production

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coopstats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting co-op stats scoring service");

    let rules_path =
        std::env::var("RULES_PATH").unwrap_or_else(|_| "config/point-rules.json".to_string());
    let rules = match RuleSetHandle::load(&rules_path) {
        Ok(rules) => rules,
        Err(err) => {
            // No ruleset means no calculation can ever succeed; fail fast.
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    };

    // Create shared application state with dependency injection
    // Easy to switch between implementations:
    let repository = Arc::new(InMemoryStatsRepository::new());

    // For production with PostgreSQL:
    // let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    // let pool = sqlx::PgPool::connect(&database_url).await.expect("Failed to connect to database");
    // let repository = Arc::new(PostgresStatsRepository::new(pool));

    let app_state = AppState::new(repository, rules);

    let app = Router::new()
        .route("/api/points/config", get(scoring::handlers::get_config))
        .route("/api/points/reload", post(scoring::handlers::reload_config))
        .route(
            "/api/points/session",
            post(scoring::handlers::session_points),
        )
        .route("/api/points/map", post(scoring::handlers::map_points))
        .route("/api/points/mvp", post(scoring::handlers::calculate_mvp))
        .route(
            "/api/validation/user/:player_id",
            get(validation::handlers::validate_user),
        )
        .route(
            "/api/validation/batch",
            get(validation::handlers::validate_batch),
        )
        .route(
            "/api/validation/fix/:player_id",
            post(validation::handlers::fix_user),
        )
        .route(
            "/api/validation/recalculate/all",
            post(validation::handlers::recalculate_all),
        )
        .route(
            "/api/validation/orphaned",
            get(validation::handlers::check_orphans),
        )
        .route(
            "/api/validation/health",
            get(validation::handlers::health_report),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!("Server running on http://localhost:{port}");
    axum::serve(listener, app).await.unwrap();
}
