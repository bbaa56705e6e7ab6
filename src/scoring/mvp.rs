use std::cmp::Ordering;

use super::calculator::calculate;
use super::models::{PlayerScore, RankingMode, RankingResult, StatRecord};
use super::rules::{MvpCriterion, RuleSet, SortDirection};

/// Ranks one record per player within a single scope and marks exactly one
/// MVP. Callers are responsible for handing in records that share a scope;
/// the engine only orders what it is given. Empty input yields an empty
/// result, not an error.
pub fn rank(records: &[StatRecord], rules: &RuleSet, mode: RankingMode) -> RankingResult {
    if records.is_empty() {
        return RankingResult::default();
    }

    let mut scored: Vec<(usize, f64)> = records
        .iter()
        .enumerate()
        .map(|(index, record)| (index, calculate(record, rules).total))
        .collect();

    match mode {
        RankingMode::Score => {
            // Descending total; exact ties fall back to ascending player id so
            // the winner never depends on input order.
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| records[a.0].player_id.cmp(&records[b.0].player_id))
            });
        }
        RankingMode::Criteria => {
            scored.sort_by(|a, b| {
                compare_by_criteria(&records[a.0], &records[b.0], &rules.mvp_criteria)
            });
        }
    }

    let rankings = scored
        .into_iter()
        .enumerate()
        .map(|(position, (index, total))| PlayerScore {
            player_id: records[index].player_id.clone(),
            total,
            is_mvp: position == 0,
        })
        .collect();

    RankingResult { rankings }
}

/// Ranks totals the caller computed elsewhere (e.g. persisted point columns).
/// Same ordering contract as score mode.
pub fn rank_precomputed(scores: &[(String, f64)]) -> RankingResult {
    let mut ordered: Vec<&(String, f64)> = scores.iter().collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let rankings = ordered
        .into_iter()
        .enumerate()
        .map(|(position, (player_id, total))| PlayerScore {
            player_id: player_id.clone(),
            total: *total,
            is_mvp: position == 0,
        })
        .collect();

    RankingResult { rankings }
}

/// Lexicographic multi-key comparison: the first criterion that differs
/// decides, later criteria only break earlier ties.
fn compare_by_criteria(a: &StatRecord, b: &StatRecord, criteria: &[MvpCriterion]) -> Ordering {
    for criterion in criteria {
        let left = a.counter(&criterion.field);
        let right = b.counter(&criterion.field);
        let ordering = match criterion.direction {
            SortDirection::Desc => right.partial_cmp(&left),
            SortDirection::Asc => left.partial_cmp(&right),
        }
        .unwrap_or(Ordering::Equal);

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::models::RecordScope;

    fn rules() -> RuleSet {
        RuleSet::from_json(
            r#"{
                "version": "test",
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
                    { "field": "special_kills", "direction": "desc" },
                    { "field": "survivor_ff", "direction": "asc" }
                ]}
            }"#,
        )
        .unwrap()
    }

    fn session_record(player_id: &str) -> StatRecord {
        StatRecord::new(player_id, RecordScope::Session("game-1".into()))
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let result = rank(&[], &rules(), RankingMode::Score);
        assert!(result.rankings.is_empty());
        assert!(result.mvp().is_none());
    }

    #[test]
    fn exactly_one_mvp_in_any_non_empty_set() {
        let records = vec![
            session_record("a").with_counter("common_kills", 10.0),
            session_record("b").with_counter("common_kills", 10.0),
            session_record("c").with_counter("common_kills", 10.0),
        ];

        for mode in [RankingMode::Score, RankingMode::Criteria] {
            let result = rank(&records, &rules(), mode);
            let mvp_count = result.rankings.iter().filter(|r| r.is_mvp).count();
            assert_eq!(mvp_count, 1, "{mode}");
        }
    }

    #[test]
    fn score_mode_ranks_by_total() {
        let records = vec![
            session_record("low").with_counter("common_kills", 5.0),
            session_record("high").with_counter("common_kills", 50.0),
            session_record("mid").with_counter("common_kills", 20.0),
        ];

        let result = rank(&records, &rules(), RankingMode::Score);
        let ids: Vec<&str> = result
            .rankings
            .iter()
            .map(|r| r.player_id.as_str())
            .collect();
        assert_eq!(ids, ["high", "mid", "low"]);
        assert_eq!(result.mvp().unwrap().player_id, "high");
        assert_eq!(result.mvp().unwrap().total, 50.0);
    }

    #[test]
    fn score_mode_ties_break_by_ascending_player_id() {
        let records = vec![
            session_record("zeta").with_counter("common_kills", 30.0),
            session_record("alpha").with_counter("common_kills", 30.0),
        ];

        let result = rank(&records, &rules(), RankingMode::Score);
        assert_eq!(result.mvp().unwrap().player_id, "alpha");
    }

    #[test]
    fn criteria_mode_orders_by_first_field() {
        let records = vec![
            session_record("fewer").with_counter("special_kills", 3.0),
            session_record("more").with_counter("special_kills", 9.0),
        ];

        let result = rank(&records, &rules(), RankingMode::Criteria);
        assert_eq!(result.mvp().unwrap().player_id, "more");
    }

    #[test]
    fn tied_first_criterion_resolves_on_second() {
        // Both killed 5 specials; the cleaner player (less friendly fire,
        // ascending direction) must win on the second criterion.
        let records = vec![
            session_record("sloppy")
                .with_counter("special_kills", 5.0)
                .with_counter("survivor_ff", 120.0),
            session_record("clean")
                .with_counter("special_kills", 5.0)
                .with_counter("survivor_ff", 10.0),
        ];

        let result = rank(&records, &rules(), RankingMode::Criteria);
        assert_eq!(result.mvp().unwrap().player_id, "clean");
    }

    #[test]
    fn full_criteria_tie_is_stable_on_input_order() {
        let records = vec![session_record("first"), session_record("second")];
        let result = rank(&records, &rules(), RankingMode::Criteria);
        assert_eq!(result.rankings[0].player_id, "first");
        assert!(result.rankings[0].is_mvp);
    }

    #[test]
    fn precomputed_scores_rank_without_recalculation() {
        let scores = vec![
            ("b".to_string(), 100.0),
            ("a".to_string(), 100.0),
            ("c".to_string(), 40.0),
        ];

        let result = rank_precomputed(&scores);
        assert_eq!(result.mvp().unwrap().player_id, "a");
        assert_eq!(result.rankings[2].player_id, "c");
    }
}
