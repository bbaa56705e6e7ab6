use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::shared::AppError;

use super::models::StatRecord;

/// Explicit per-unit multiplier slot a rule declares. Replaces the legacy
/// "first truthy of many keys" selection with a discriminated field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MultiplierKind {
    PerKill,
    PerHeadshot,
    PerDamage,
    PerHeal,
    PerRevive,
    PerDefib,
    PerCrown,
    PerSave,
    PerPack,
    PerUse,
    PerDeath,
    PerFinale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

/// A single numeric comparison of the form `<field> <op> <literal>`, the whole
/// of the condition grammar. Config text is parsed once at load time and never
/// evaluated as code.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub literal: f64,
}

impl Condition {
    pub fn evaluate(&self, record: &StatRecord) -> bool {
        let value = record.counter(&self.field);
        match self.op {
            CompareOp::Gt => value > self.literal,
            CompareOp::Ge => value >= self.literal,
            CompareOp::Lt => value < self.literal,
            CompareOp::Le => value <= self.literal,
            CompareOp::Eq => value == self.literal,
        }
    }
}

impl FromStr for Condition {
    type Err = AppError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let &[field, op, literal] = tokens.as_slice() else {
            return Err(AppError::Configuration(format!(
                "condition '{text}' is not of the form '<field> <op> <literal>'"
            )));
        };

        let op = match op {
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            "==" => CompareOp::Eq,
            other => {
                return Err(AppError::Configuration(format!(
                    "condition '{text}' uses unsupported operator '{other}'"
                )))
            }
        };

        let literal: f64 = literal.parse().map_err(|_| {
            AppError::Configuration(format!(
                "condition '{text}' has a non-numeric literal '{literal}'"
            ))
        })?;

        if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Configuration(format!(
                "condition '{text}' references invalid field '{field}'"
            )));
        }

        Ok(Condition {
            field: field.to_string(),
            op,
            literal,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpecialCalculation {
    /// `floor(min(1, value / cap_estimate) * scale_factor)` — converts a
    /// cumulative damage counter into a bounded kill-equivalent score.
    DamagePercentOfCappedTotal { cap_estimate: f64, scale_factor: f64 },
    /// `floor(value * ratio)` — approximates a derived quantity from a single
    /// correlated counter.
    RatioOfValue { ratio: f64 },
}

#[derive(Debug, Clone)]
pub enum BaseRuleKind {
    Conditional { condition: Condition, points: f64 },
    PerUnit { field: String, multiplier: f64 },
    Special { field: String, calculation: SpecialCalculation },
}

#[derive(Debug, Clone)]
pub struct BaseRule {
    pub kind: BaseRuleKind,
    pub enabled: bool,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct PenaltyRule {
    pub field: String,
    /// Per-unit deduction, always a non-negative magnitude.
    pub magnitude: f64,
    /// Ceiling on the total deduction, as a non-negative magnitude.
    pub max_penalty: Option<f64>,
    pub enabled: bool,
    pub description: String,
}

/// Proportional adjustments are a reserved stage: every rule in the current
/// ruleset is disabled, but the stage itself must survive so a future ruleset
/// can reintroduce them without engine changes.
#[derive(Debug, Clone)]
pub struct MultiplierRule {
    pub enabled: bool,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct BonusRule {
    pub condition: Condition,
    pub points: f64,
    pub enabled: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MvpCriterion {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Versioned, compiled scoring configuration. Immutable once built; reloads
/// produce a fresh value behind a new `Arc`.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub version: String,
    pub last_updated: String,
    pub round_final_score: bool,
    pub base_rules: BTreeMap<String, BaseRule>,
    pub penalty_rules: BTreeMap<String, PenaltyRule>,
    pub multiplier_rules: BTreeMap<String, MultiplierRule>,
    pub bonus_rules: BTreeMap<String, BonusRule>,
    pub mvp_criteria: Vec<MvpCriterion>,
    pub validation_limits: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Raw document shapes, as they appear in the JSON file.

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    #[serde(default)]
    pub source_field: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub multiplier_kind: Option<MultiplierKind>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub calculation: Option<String>,
    #[serde(default)]
    pub cap_estimate: Option<f64>,
    #[serde(default)]
    pub scale_factor: Option<f64>,
    #[serde(default)]
    pub ratio: Option<f64>,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub max_penalty: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleGroup {
    #[serde(default)]
    pub rules: BTreeMap<String, RawRule>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CalculationSettings {
    #[serde(default)]
    pub round_final_score: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MvpConfig {
    #[serde(default)]
    pub criteria: Vec<MvpCriterion>,
}

#[derive(Debug, Deserialize)]
pub struct RuleFile {
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub calculation_settings: CalculationSettings,
    #[serde(default)]
    pub base_points: RuleGroup,
    #[serde(default)]
    pub penalties: RuleGroup,
    #[serde(default)]
    pub multipliers: RuleGroup,
    #[serde(default)]
    pub special_bonuses: RuleGroup,
    #[serde(default)]
    pub mvp_calculation: MvpConfig,
    #[serde(default)]
    pub validation_limits: BTreeMap<String, f64>,
}

impl RuleSet {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            AppError::Configuration(format!("cannot read ruleset {}: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let file: RuleFile = serde_json::from_str(text)
            .map_err(|err| AppError::Configuration(format!("ruleset does not parse: {err}")))?;
        Ok(Self::compile(file))
    }

    /// Compiles the raw document into typed rules. Malformed entries are
    /// skipped with a warning; a bad rule must not take the whole ruleset down.
    fn compile(file: RuleFile) -> Self {
        let mut base_rules = BTreeMap::new();
        for (name, raw) in &file.base_points.rules {
            match compile_base_rule(raw) {
                Ok(kind) => {
                    base_rules.insert(
                        name.clone(),
                        BaseRule {
                            kind,
                            enabled: raw.enabled,
                            description: raw.description.clone(),
                        },
                    );
                }
                Err(reason) => warn!(rule = %name, %reason, "skipping malformed base rule"),
            }
        }

        let mut penalty_rules = BTreeMap::new();
        for (name, raw) in &file.penalties.rules {
            let Some(field) = raw.source_field.clone() else {
                warn!(rule = %name, "skipping penalty rule without source_field");
                continue;
            };
            penalty_rules.insert(
                name.clone(),
                PenaltyRule {
                    field,
                    magnitude: raw.multiplier.unwrap_or(0.0).abs(),
                    max_penalty: raw.max_penalty.map(f64::abs),
                    enabled: raw.enabled,
                    description: raw.description.clone(),
                },
            );
        }

        let multiplier_rules = file
            .multipliers
            .rules
            .iter()
            .map(|(name, raw)| {
                (
                    name.clone(),
                    MultiplierRule {
                        enabled: raw.enabled,
                        description: raw.description.clone(),
                    },
                )
            })
            .collect();

        let mut bonus_rules = BTreeMap::new();
        for (name, raw) in &file.special_bonuses.rules {
            let condition = match &raw.condition {
                Some(text) => match text.parse::<Condition>() {
                    Ok(condition) => condition,
                    Err(err) => {
                        warn!(rule = %name, %err, "skipping bonus rule with bad condition");
                        continue;
                    }
                },
                None => {
                    warn!(rule = %name, "skipping bonus rule without condition");
                    continue;
                }
            };
            let Some(points) = raw.points else {
                warn!(rule = %name, "skipping bonus rule without points");
                continue;
            };
            bonus_rules.insert(
                name.clone(),
                BonusRule {
                    condition,
                    points,
                    enabled: raw.enabled,
                    description: raw.description.clone(),
                },
            );
        }

        RuleSet {
            version: file.version,
            last_updated: file.last_updated,
            round_final_score: file.calculation_settings.round_final_score,
            base_rules,
            penalty_rules,
            multiplier_rules,
            bonus_rules,
            mvp_criteria: file.mvp_calculation.criteria,
            validation_limits: file.validation_limits,
        }
    }
}

fn compile_base_rule(raw: &RawRule) -> Result<BaseRuleKind, String> {
    if let Some(text) = &raw.condition {
        let condition = text
            .parse::<Condition>()
            .map_err(|err| err.to_string())?;
        let points = raw
            .points
            .ok_or_else(|| "conditional rule has no points".to_string())?;
        return Ok(BaseRuleKind::Conditional { condition, points });
    }

    let field = raw
        .source_field
        .clone()
        .ok_or_else(|| "rule has neither condition nor source_field".to_string())?;

    if let Some(calculation) = &raw.calculation {
        let calculation = match calculation.as_str() {
            "damage_percent_of_capped_total" => SpecialCalculation::DamagePercentOfCappedTotal {
                cap_estimate: raw.cap_estimate.unwrap_or(6000.0),
                scale_factor: raw.scale_factor.unwrap_or(100.0),
            },
            "ratio_of_value" => SpecialCalculation::RatioOfValue {
                ratio: raw.ratio.unwrap_or(0.3),
            },
            other => return Err(format!("unknown calculation '{other}'")),
        };
        return Ok(BaseRuleKind::Special { field, calculation });
    }

    if raw.multiplier_kind.is_none() {
        return Err("per-unit rule has no multiplier_kind".to_string());
    }

    Ok(BaseRuleKind::PerUnit {
        field,
        multiplier: raw.multiplier.unwrap_or(1.0),
    })
}

/// Process-wide handle to the current ruleset. Readers take an `Arc` snapshot,
/// so in-flight calculations keep the ruleset they started with; `reload`
/// swaps the pointer in one step.
#[derive(Clone)]
pub struct RuleSetHandle {
    current: Arc<RwLock<Arc<RuleSet>>>,
    path: Option<Arc<PathBuf>>,
}

impl RuleSetHandle {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let rules = RuleSet::from_file(&path)?;
        info!(version = %rules.version, path = %path.display(), "point ruleset loaded");
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(rules))),
            path: Some(Arc::new(path)),
        })
    }

    /// Wraps an already-built ruleset; reloading is unavailable.
    pub fn from_rules(rules: RuleSet) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(rules))),
            path: None,
        }
    }

    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().unwrap())
    }

    pub fn reload(&self) -> Result<Arc<RuleSet>, AppError> {
        let path = self.path.as_ref().ok_or_else(|| {
            AppError::Configuration("ruleset was not loaded from a file; cannot reload".to_string())
        })?;
        let rules = Arc::new(RuleSet::from_file(path)?);
        *self.current.write().unwrap() = Arc::clone(&rules);
        info!(version = %rules.version, "point ruleset reloaded");
        Ok(rules)
    }
}
