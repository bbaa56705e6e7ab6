use tracing::debug;

use super::models::{
    BasePointsEntry, BonusEntry, DataSource, PenaltyEntry, ScoreBreakdown, StatRecord,
};
use super::rules::{BaseRuleKind, RuleSet, SpecialCalculation};

/// Evaluates the ruleset against one record and produces an itemized
/// breakdown. Pure function of its two inputs: no I/O, no hidden state, and
/// never an error for data-shape reasons (absent counters read as zero).
///
/// The total is unclamped; bounding to a persistence range is the caller's
/// policy, not the calculator's.
pub fn calculate(record: &StatRecord, rules: &RuleSet) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::empty(DataSource::from(&record.scope));

    apply_base_points(record, rules, &mut breakdown);
    apply_penalties(record, rules, &mut breakdown);
    apply_multipliers(rules, &mut breakdown);
    apply_special_bonuses(record, rules, &mut breakdown);
    collect_limit_warnings(record, rules, &mut breakdown);

    let base: f64 = breakdown.base_points.values().map(|entry| entry.points).sum();
    let penalties: f64 = breakdown.penalties.values().map(|entry| entry.penalty).sum();
    let bonuses: f64 = breakdown
        .special_bonuses
        .values()
        .map(|entry| entry.points)
        .sum();

    let mut total = base - penalties + bonuses;
    if rules.round_final_score {
        total = total.round();
    }
    breakdown.total = total;

    breakdown
}

fn apply_base_points(record: &StatRecord, rules: &RuleSet, breakdown: &mut ScoreBreakdown) {
    for (name, rule) in &rules.base_rules {
        if !rule.enabled {
            continue;
        }

        let (value, points) = match &rule.kind {
            BaseRuleKind::Conditional { condition, points } => {
                if !condition.evaluate(record) {
                    continue;
                }
                (1.0, *points)
            }
            BaseRuleKind::PerUnit { field, multiplier } => {
                let value = record.counter(field);
                (value, value * multiplier)
            }
            BaseRuleKind::Special { field, calculation } => {
                let value = record.counter(field);
                (value, apply_special_calculation(calculation, value))
            }
        };

        // Zero and negative contributions stay out of the itemization; they
        // are implicitly zero in the total.
        if points > 0.0 {
            breakdown
                .details
                .push(format!("{}: {} = +{}", rule.description, value, points));
            breakdown.base_points.insert(
                name.clone(),
                BasePointsEntry {
                    value,
                    points,
                    description: rule.description.clone(),
                },
            );
        }
    }
}

fn apply_special_calculation(calculation: &SpecialCalculation, value: f64) -> f64 {
    match calculation {
        SpecialCalculation::DamagePercentOfCappedTotal {
            cap_estimate,
            scale_factor,
        } => {
            let fraction = if *cap_estimate > 0.0 {
                (value / cap_estimate).min(1.0)
            } else {
                0.0
            };
            (fraction * scale_factor).floor()
        }
        SpecialCalculation::RatioOfValue { ratio } => (value * ratio).floor(),
    }
}

fn apply_penalties(record: &StatRecord, rules: &RuleSet, breakdown: &mut ScoreBreakdown) {
    for (name, rule) in &rules.penalty_rules {
        if !rule.enabled {
            continue;
        }

        let value = record.counter(&rule.field);
        if value <= 0.0 {
            continue;
        }

        let mut penalty = value * rule.magnitude;
        if let Some(ceiling) = rule.max_penalty {
            penalty = penalty.min(ceiling);
        }

        if penalty > 0.0 {
            breakdown
                .details
                .push(format!("{}: {} = -{}", rule.description, value, penalty));
            breakdown.penalties.insert(
                name.clone(),
                PenaltyEntry {
                    value,
                    penalty,
                    description: rule.description.clone(),
                },
            );
        }
    }
}

/// Reserved stage for proportional adjustments. Every rule in the current
/// ruleset is disabled, so this contributes nothing today, but the stage is
/// iterated so a future ruleset can enable rules without engine changes.
fn apply_multipliers(rules: &RuleSet, _breakdown: &mut ScoreBreakdown) {
    for (name, rule) in &rules.multiplier_rules {
        if !rule.enabled {
            continue;
        }
        debug!(rule = %name, "multiplier rule is enabled but has no proportional formula yet");
    }
}

fn apply_special_bonuses(record: &StatRecord, rules: &RuleSet, breakdown: &mut ScoreBreakdown) {
    for (name, rule) in &rules.bonus_rules {
        if !rule.enabled {
            continue;
        }
        if !rule.condition.evaluate(record) {
            continue;
        }

        breakdown
            .details
            .push(format!("{}: +{}", rule.description, rule.points));
        breakdown.special_bonuses.insert(
            name.clone(),
            BonusEntry {
                points: rule.points,
                description: rule.description.clone(),
            },
        );
    }
}

fn collect_limit_warnings(record: &StatRecord, rules: &RuleSet, breakdown: &mut ScoreBreakdown) {
    for (field, max) in &rules.validation_limits {
        let value = record.counter(field);
        if value > *max {
            breakdown.warnings.push(format!(
                "{field} value {value} exceeds plausible maximum {max}"
            ));
        }
    }
}
