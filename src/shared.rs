use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::scoring::rules::RuleSetHandle;
use crate::validation::repository::StatsRepository;
use crate::validation::service::ValidationService;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn StatsRepository>,
    pub rules: RuleSetHandle,
    pub validation: Arc<ValidationService>,
}

impl AppState {
    pub fn new(repository: Arc<dyn StatsRepository>, rules: RuleSetHandle) -> Self {
        let validation = Arc::new(ValidationService::new(Arc::clone(&repository)));
        Self {
            repository,
            rules,
            validation,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Ruleset missing or unparseable; fatal to any calculation until fixed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Repair write-back failed; nothing was persisted.
    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::Transaction(_) => "transaction",
            AppError::Repository(_) => "repository",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) | AppError::Transaction(_) | AppError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::scoring::rules::RuleSet;
    use crate::validation::repository::InMemoryStatsRepository;

    /// Minimal ruleset for handler tests that do not care about rule content.
    pub fn test_rules() -> RuleSet {
        RuleSet::from_json(
            r#"{
                "version": "test",
                "last_updated": "2025-01-01T00:00:00Z",
                "calculation_settings": { "round_final_score": true },
                "base_points": { "rules": {
                    "common_kill": {
                        "source_field": "common_kills",
                        "multiplier_kind": "per_kill",
                        "multiplier": 1,
                        "description": "Common infected killed"
                    }
                }},
                "mvp_calculation": { "criteria": [
                    { "field": "special_kills", "direction": "desc" }
                ]}
            }"#,
        )
        .unwrap()
    }

    /// Builder for creating AppState with overrides for testing
    pub struct AppStateBuilder {
        repository: Option<Arc<dyn StatsRepository>>,
        rules: Option<RuleSetHandle>,
    }

    impl AppStateBuilder {
        pub fn new() -> Self {
            Self {
                repository: None,
                rules: None,
            }
        }

        pub fn with_repository(mut self, repository: Arc<dyn StatsRepository>) -> Self {
            self.repository = Some(repository);
            self
        }

        pub fn with_rules(mut self, rules: RuleSetHandle) -> Self {
            self.rules = Some(rules);
            self
        }

        pub fn build(self) -> AppState {
            let repository = self
                .repository
                .unwrap_or_else(|| Arc::new(InMemoryStatsRepository::new()));
            let rules = self
                .rules
                .unwrap_or_else(|| RuleSetHandle::from_rules(test_rules()));
            AppState::new(repository, rules)
        }
    }

    impl Default for AppStateBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
