pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;

pub use models::{
    BatchRepairResult, BatchReport, DiscrepancyReport, FieldDiscrepancy, HealthReport,
    OrphanGroup, OrphanReport, RepairResult, TableCounts,
};
pub use repository::{InMemoryStatsRepository, PostgresStatsRepository, StatsRepository};
pub use service::{compare_totals, default_tracked_fields, ValidationService, MAX_BATCH_LIMIT};
