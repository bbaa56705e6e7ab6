// Library crate for the co-op stats scoring and reconciliation service
// This file exposes the public API for integration tests

pub mod scoring;
pub mod shared;
pub mod validation;

// Re-export commonly used types for easier access in tests
pub use scoring::{
    calculate, rank, RankingMode, RankingResult, RecordScope, RuleSet, RuleSetHandle,
    ScoreBreakdown, StatRecord,
};
pub use shared::{AppError, AppState};
pub use validation::{
    DiscrepancyReport, InMemoryStatsRepository, StatsRepository, ValidationService,
};
