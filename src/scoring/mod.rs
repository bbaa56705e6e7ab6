pub mod calculator;
pub mod handlers;
pub mod models;
pub mod mvp;
pub mod rules;

pub use calculator::calculate;
pub use models::{
    DataSource, PlayerScore, RankingMode, RankingResult, RecordScope, ScoreBreakdown, StatRecord,
};
pub use mvp::{rank, rank_precomputed};
pub use rules::{Condition, MultiplierKind, MvpCriterion, RuleSet, RuleSetHandle};
