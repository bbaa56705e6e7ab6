use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The six per-special kill counters that roll up into `special_kills`.
const SPECIAL_KILL_FIELDS: [&str; 6] = [
    "kills_smoker",
    "kills_boomer",
    "kills_hunter",
    "kills_spitter",
    "kills_jockey",
    "kills_charger",
];

/// Which slice of play a record covers: one game session, one map, or a
/// player's lifetime aggregate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RecordScope {
    Session(String),
    Map(String),
    Lifetime,
}

impl Default for RecordScope {
    fn default() -> Self {
        RecordScope::Lifetime
    }
}

/// Flat counter set for one player over one scope. Counters the record does
/// not carry read as zero; arithmetic never sees a missing field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub player_id: String,
    #[serde(default)]
    pub scope: RecordScope,
    #[serde(default)]
    pub counters: BTreeMap<String, f64>,
}

impl StatRecord {
    pub fn new(player_id: impl Into<String>, scope: RecordScope) -> Self {
        Self {
            player_id: player_id.into(),
            scope,
            counters: BTreeMap::new(),
        }
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    /// Builds a record from a raw JSON object. Non-numeric values become 0
    /// rather than poisoning later arithmetic.
    pub fn from_json(
        player_id: impl Into<String>,
        scope: RecordScope,
        data: &serde_json::Value,
    ) -> Self {
        let mut record = Self::new(player_id, scope);
        if let Some(map) = data.as_object() {
            for (key, value) in map {
                record
                    .counters
                    .insert(key.clone(), value.as_f64().unwrap_or(0.0));
            }
        }
        record
    }

    pub fn counter(&self, name: &str) -> f64 {
        self.counters.get(name).copied().unwrap_or(0.0)
    }

    pub fn counter_as_int(&self, name: &str) -> i64 {
        self.counter(name) as i64
    }

    /// Materializes the derived `special_kills` counter from the per-special
    /// kill fields when the source row does not carry it, so rules and MVP
    /// criteria referencing it work against raw rows.
    pub fn ensure_special_kills(&mut self) {
        if self.counters.contains_key("special_kills") {
            return;
        }
        let total: f64 = SPECIAL_KILL_FIELDS
            .iter()
            .map(|field| self.counter(field))
            .sum();
        self.counters.insert("special_kills".to_string(), total);
    }
}

/// Which table a breakdown was computed from, echoed back to callers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
    Session,
    Map,
    Lifetime,
}

impl From<&RecordScope> for DataSource {
    fn from(scope: &RecordScope) -> Self {
        match scope {
            RecordScope::Session(_) => DataSource::Session,
            RecordScope::Map(_) => DataSource::Map,
            RecordScope::Lifetime => DataSource::Lifetime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasePointsEntry {
    pub value: f64,
    pub points: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyEntry {
    pub value: f64,
    pub penalty: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusEntry {
    pub points: f64,
    pub description: String,
}

/// Itemized output of the point calculator. The invariant
/// `total == round(sum(base) - sum(penalties) + sum(bonuses))` holds whenever
/// the ruleset requests rounding; otherwise the total is the raw sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_points: BTreeMap<String, BasePointsEntry>,
    pub penalties: BTreeMap<String, PenaltyEntry>,
    pub multipliers: BTreeMap<String, f64>,
    pub special_bonuses: BTreeMap<String, BonusEntry>,
    pub details: Vec<String>,
    /// Advisory plausibility warnings; never block calculation.
    pub warnings: Vec<String>,
    pub total: f64,
    pub data_source: DataSource,
}

impl ScoreBreakdown {
    pub fn empty(data_source: DataSource) -> Self {
        Self {
            base_points: BTreeMap::new(),
            penalties: BTreeMap::new(),
            multipliers: BTreeMap::new(),
            special_bonuses: BTreeMap::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            total: 0.0,
            data_source,
        }
    }
}

/// How the MVP for a scope is determined.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RankingMode {
    /// Lexicographic ordering over the ruleset's MVP criteria list.
    Criteria,
    /// Descending point total, ties broken by ascending player id.
    Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub player_id: String,
    pub total: f64,
    pub is_mvp: bool,
}

/// Ranked players for one scope. Exactly one entry carries `is_mvp == true`
/// for any non-empty input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub rankings: Vec<PlayerScore>,
}

impl RankingResult {
    pub fn mvp(&self) -> Option<&PlayerScore> {
        self.rankings.iter().find(|entry| entry.is_mvp)
    }
}
