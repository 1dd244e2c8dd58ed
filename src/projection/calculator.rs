//! The statistical core: turns raw season totals or recent match history
//! into per-game rates, applies the position-specific scoring formula with
//! its Poisson clean-sheet term, and assembles the ranked snapshot.
//!
//! Eligibility is exclusion-over-fabrication: players with no usable sample
//! (zero minutes pre-season, zero qualifying matches in-season) or a
//! non-positive price are left out of the output entirely. No placeholder
//! minimums are ever substituted — they destroy differentiation between
//! players.

use chrono::{DateTime, Utc};
use statrs::distribution::{Discrete, Poisson};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::fdr;
use super::season::SeasonPhase;
use crate::config::Config;
use crate::error::RefreshError;
use crate::models::{Fixture, MatchRecord, Position, ProjectedPlayer, RawPlayer, Snapshot};

/// Averaged per-game line feeding the scoring formula. All rate fields are
/// non-negative by construction; `points` may go negative (cards, own goals).
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLine {
    pub xg: f64,
    pub xa: f64,
    pub xgc: f64,
    pub minutes: f64,
    pub bonus: f64,
    pub saves: f64,
    pub points: f64,
}

/// Poisson probability mass at `k` goals for mean `lambda`. λ ≤ 0 is the
/// degenerate distribution at zero: certain clean sheet.
pub fn poisson_pmf(lambda: f64, k: u64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    match Poisson::new(lambda) {
        Ok(dist) => dist.pmf(k),
        Err(_) => 0.0,
    }
}

/// Appearance-points band: 0 (did not play), 1 (sub, < 60 min), 2 (started).
pub fn minutes_category(minutes: f64) -> u8 {
    if minutes <= 0.0 {
        0
    } else if minutes < 60.0 {
        1
    } else {
        2
    }
}

/// Poisson mass at the even conceded counts 2, 4, ..., 14: an approximation
/// of the expected point loss from multi-goal concession bands.
fn concession_penalty(xgc: f64) -> f64 {
    (1..=7).map(|i| poisson_pmf(xgc, 2 * i)).sum()
}

/// Position-specific expected points per game.
pub fn expected_points(position: Position, rates: &RateLine) -> f64 {
    let category = minutes_category(rates.minutes) as f64;
    let clean_sheet_prob = poisson_pmf(rates.xgc, 0);

    match position {
        Position::Goalkeeper => {
            let mut xppg = 3.0 * rates.xa + category + rates.bonus + rates.saves / 3.0;
            if rates.minutes >= 60.0 {
                xppg += 4.0 * clean_sheet_prob;
                xppg -= concession_penalty(rates.xgc);
            }
            xppg
        }
        Position::Defender => {
            let mut xppg = 6.0 * rates.xg + 3.0 * rates.xa + category + rates.bonus;
            if rates.minutes >= 60.0 {
                xppg += 4.0 * clean_sheet_prob;
                xppg -= concession_penalty(rates.xgc);
            }
            xppg
        }
        Position::Midfielder => {
            let cs_points = if category == 2.0 { clean_sheet_prob } else { 0.0 };
            5.0 * rates.xg + 3.0 * rates.xa + category + rates.bonus + cs_points
        }
        Position::Attacker => 4.0 * rates.xg + 3.0 * rates.xa + category + rates.bonus,
    }
}

/// Branch A: per-game rates from season-cumulative totals. Games played is
/// derived from cumulative minutes at `per_match_minutes` per full game,
/// floored, minimum 1. Zero recorded minutes means the player cannot be
/// projected and is excluded.
pub fn rates_from_totals(player: &RawPlayer, per_match_minutes: f64) -> Option<RateLine> {
    if player.minutes == 0 {
        return None;
    }
    let games = (player.minutes as f64 / per_match_minutes).floor().max(1.0);
    Some(RateLine {
        xg: player.goals as f64 / games,
        xa: player.assists as f64 / games,
        xgc: if player.position == Position::Attacker {
            0.0
        } else {
            player.goals_conceded as f64 / games
        },
        minutes: player.minutes as f64 / games,
        bonus: player.bonus as f64 / games,
        saves: if player.position == Position::Goalkeeper {
            player.saves as f64 / games
        } else {
            0.0
        },
        points: player.total_points as f64 / games,
    })
}

/// Branch B: per-game rates averaged over the last up-to-`window` match
/// records by kickoff time. Zero qualifying records excludes the player.
pub fn rates_from_history(
    position: Position,
    history: &[MatchRecord],
    window: usize,
) -> Option<RateLine> {
    if history.is_empty() || window == 0 {
        return None;
    }

    let mut ordered: Vec<&MatchRecord> = history.iter().collect();
    ordered.sort_by_key(|r| r.kickoff);
    let recent = &ordered[ordered.len().saturating_sub(window)..];
    let n = recent.len() as f64;

    let mut line = RateLine::default();
    for record in recent {
        line.xg += record.xg.max(0.0);
        line.xa += record.xa.max(0.0);
        line.xgc += record.xgc.max(0.0);
        line.minutes += record.minutes as f64;
        line.bonus += record.bonus as f64;
        if position == Position::Goalkeeper {
            line.saves += record.saves as f64;
        }
        line.points += record.total_points as f64;
    }
    line.xg /= n;
    line.xa /= n;
    line.xgc /= n;
    line.minutes /= n;
    line.bonus /= n;
    line.saves /= n;
    line.points /= n;
    Some(line)
}

/// Everything one refresh cycle feeds the calculator.
pub struct SnapshotInputs {
    pub players: Vec<RawPlayer>,
    pub teams: HashMap<u32, String>,
    pub fixtures: Vec<Fixture>,
    /// Per-player match history; only populated in-season.
    pub histories: HashMap<u32, Vec<MatchRecord>>,
    pub phase: SeasonPhase,
}

/// Build the full ranked snapshot. Fails with `NoEligiblePlayers` when the
/// exclusion rules leave nothing to rank — that is a failed cycle, not an
/// empty-but-valid result.
pub fn build_snapshot(
    inputs: &SnapshotInputs,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Snapshot, RefreshError> {
    let mut fdr_by_team: HashMap<u32, (Option<f64>, Option<f64>)> = HashMap::new();
    let mut by_position: BTreeMap<Position, Vec<ProjectedPlayer>> = Position::ALL
        .iter()
        .map(|p| (*p, Vec::new()))
        .collect();
    let mut excluded = 0usize;

    for player in &inputs.players {
        let price = player.price();
        if price <= 0.0 {
            // Division guard: resolved by exclusion, never by propagation.
            debug!(player = %player.name, price, "excluded: non-positive price");
            excluded += 1;
            continue;
        }

        let rates = match inputs.phase {
            SeasonPhase::PreSeason => rates_from_totals(player, config.per_match_minutes),
            SeasonPhase::InSeason => inputs
                .histories
                .get(&player.id)
                .and_then(|h| rates_from_history(player.position, h, config.form_window)),
        };
        let Some(rates) = rates else {
            excluded += 1;
            continue;
        };

        let (past_fdr, future_fdr) = *fdr_by_team
            .entry(player.team_id)
            .or_insert_with(|| fdr::difficulty(player.team_id, &inputs.fixtures, now, config.form_window));

        let xppg = expected_points(player.position, &rates);
        by_position
            .get_mut(&player.position)
            .expect("all positions pre-seeded")
            .push(ProjectedPlayer {
                name: player.name.clone(),
                team: inputs
                    .teams
                    .get(&player.team_id)
                    .cloned()
                    .unwrap_or_default(),
                position: player.position,
                xg: rates.xg,
                xa: rates.xa,
                xgc: rates.xgc,
                bonus: rates.bonus,
                minutes: rates.minutes,
                saves: rates.saves,
                xppg,
                points: rates.points,
                price,
                value: rates.points / price,
                x_value: xppg / price,
                past_fdr,
                future_fdr,
            });
    }

    let ranked: usize = by_position.values().map(Vec::len).sum();
    if ranked == 0 {
        return Err(RefreshError::NoEligiblePlayers);
    }
    debug!(ranked, excluded, phase = ?inputs.phase, "snapshot assembled");

    for bucket in by_position.values_mut() {
        // Stable sort: equal xValue keeps upstream order.
        bucket.sort_by(|a, b| {
            b.x_value
                .partial_cmp(&a.x_value)
                .unwrap_or(Ordering::Equal)
        });
    }

    Ok(Snapshot {
        generated_at: now,
        by_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw_player(position: Position, now_cost: i32) -> RawPlayer {
        RawPlayer {
            id: 1,
            name: "Test Player".to_string(),
            position,
            team_id: 1,
            goals: 0,
            assists: 0,
            goals_conceded: 0,
            minutes: 0,
            saves: 0,
            bonus: 0,
            total_points: 0,
            now_cost,
        }
    }

    fn test_config() -> Config {
        Config::default()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn poisson_zero_lambda_is_certain_clean_sheet() {
        assert_eq!(poisson_pmf(0.0, 0), 1.0);
        assert_eq!(poisson_pmf(0.0, 2), 0.0);
    }

    #[test]
    fn poisson_large_lambda_clean_sheet_vanishes() {
        assert!(poisson_pmf(50.0, 0) < 1e-12);
    }

    #[test]
    fn poisson_matches_closed_form() {
        // pmf(1.2, 0) = e^-1.2
        assert!((poisson_pmf(1.2, 0) - (-1.2f64).exp()).abs() < 1e-12);
        // pmf(1.2, 2) = e^-1.2 * 1.2^2 / 2
        let expected = (-1.2f64).exp() * 1.2f64.powi(2) / 2.0;
        assert!((poisson_pmf(1.2, 2) - expected).abs() < 1e-12);
    }

    #[test]
    fn minutes_category_is_monotonic() {
        assert_eq!(minutes_category(0.0), 0);
        assert_eq!(minutes_category(0.5), 1);
        assert_eq!(minutes_category(59.9), 1);
        assert_eq!(minutes_category(60.0), 2);
        assert_eq!(minutes_category(90.0), 2);

        let mut last = 0;
        for tenth_of_minute in 0..=900 {
            let cat = minutes_category(tenth_of_minute as f64 / 10.0);
            assert!(cat >= last);
            last = cat;
        }
    }

    #[test]
    fn goalkeeper_scenario_reproduces_to_two_decimals() {
        // xA=0.10, xGC=1.2, minutes=90, bonus=0.5, saves=3.0
        let rates = RateLine {
            xg: 0.0,
            xa: 0.10,
            xgc: 1.2,
            minutes: 90.0,
            bonus: 0.5,
            saves: 3.0,
            points: 0.0,
        };
        let xppg = expected_points(Position::Goalkeeper, &rates);

        let cs = (-1.2f64).exp();
        let penalty: f64 = (1..=7)
            .map(|i| {
                let k = 2 * i;
                (-1.2f64).exp() * 1.2f64.powi(k as i32)
                    / (1..=k).map(|j| j as f64).product::<f64>()
            })
            .sum();
        let expected = 3.0 * 0.10 + 2.0 + 0.5 + 1.0 + 4.0 * cs - penalty;

        assert!((xppg - expected).abs() < 1e-9);
        assert_eq!((xppg * 100.0).round() / 100.0, 4.76);
    }

    #[test]
    fn attacker_scenario_is_exact() {
        let rates = RateLine {
            xg: 0.5,
            xa: 0.2,
            xgc: 2.0, // must be ignored for attackers
            minutes: 75.0,
            bonus: 0.3,
            saves: 0.0,
            points: 0.0,
        };
        let xppg = expected_points(Position::Attacker, &rates);
        assert!((xppg - 4.9).abs() < 1e-9);
    }

    #[test]
    fn midfielder_clean_sheet_only_when_started() {
        let mut rates = RateLine {
            xg: 0.2,
            xa: 0.1,
            xgc: 1.0,
            minutes: 90.0,
            bonus: 0.0,
            saves: 0.0,
            points: 0.0,
        };
        let started = expected_points(Position::Midfielder, &rates);
        rates.minutes = 45.0;
        let sub = expected_points(Position::Midfielder, &rates);
        // Started: category 2 + e^-1; sub: category 1, no clean-sheet term.
        assert!((started - (5.0 * 0.2 + 3.0 * 0.1 + 2.0 + (-1.0f64).exp())).abs() < 1e-9);
        assert!((sub - (5.0 * 0.2 + 3.0 * 0.1 + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn totals_branch_excludes_zero_minute_players() {
        let player = raw_player(Position::Attacker, 80);
        assert!(rates_from_totals(&player, 90.0).is_none());
    }

    #[test]
    fn totals_branch_divides_by_floored_games() {
        let mut player = raw_player(Position::Attacker, 80);
        player.minutes = 450; // 5 full games
        player.goals = 5;
        player.assists = 2;
        player.total_points = 30;
        let rates = rates_from_totals(&player, 90.0).unwrap();
        assert!((rates.xg - 1.0).abs() < 1e-9);
        assert!((rates.xa - 0.4).abs() < 1e-9);
        assert!((rates.minutes - 90.0).abs() < 1e-9);
        assert!((rates.points - 6.0).abs() < 1e-9);
    }

    #[test]
    fn totals_branch_clamps_games_to_one() {
        let mut player = raw_player(Position::Midfielder, 55);
        player.minutes = 30; // under one full game, still counts as 1
        player.goals = 1;
        let rates = rates_from_totals(&player, 90.0).unwrap();
        assert!((rates.xg - 1.0).abs() < 1e-9);
        assert!((rates.minutes - 30.0).abs() < 1e-9);
    }

    fn record(day: u32, xg: f64, points: i32) -> MatchRecord {
        MatchRecord {
            xg,
            xa: 0.0,
            xgc: 0.0,
            minutes: 90,
            bonus: 0,
            saves: 0,
            total_points: points,
            kickoff: Some(Utc.with_ymd_and_hms(2025, 8, day, 15, 0, 0).unwrap()),
        }
    }

    #[test]
    fn history_branch_averages_over_actual_window() {
        // Two records only: divide by 2, not by the window size of 4.
        let history = vec![record(1, 0.4, 6), record(2, 0.8, 2)];
        let rates = rates_from_history(Position::Attacker, &history, 4).unwrap();
        assert!((rates.xg - 0.6).abs() < 1e-9);
        assert!((rates.points - 4.0).abs() < 1e-9);
    }

    #[test]
    fn history_branch_takes_most_recent_by_kickoff() {
        // Six records; the window of 4 must cover days 3..=6.
        let history = vec![
            record(5, 1.0, 0),
            record(1, 100.0, 0),
            record(3, 1.0, 0),
            record(6, 1.0, 0),
            record(2, 100.0, 0),
            record(4, 1.0, 0),
        ];
        let rates = rates_from_history(Position::Attacker, &history, 4).unwrap();
        assert!((rates.xg - 1.0).abs() < 1e-9);
    }

    #[test]
    fn history_branch_excludes_empty_history() {
        assert!(rates_from_history(Position::Attacker, &[], 4).is_none());
    }

    fn inputs_with(players: Vec<RawPlayer>, phase: SeasonPhase) -> SnapshotInputs {
        SnapshotInputs {
            players,
            teams: HashMap::from([(1, "Test FC".to_string())]),
            fixtures: Vec::new(),
            histories: HashMap::new(),
            phase,
        }
    }

    #[test]
    fn zero_price_players_never_appear() {
        let mut free = raw_player(Position::Attacker, 0);
        free.minutes = 90;
        free.goals = 3;
        let mut paid = raw_player(Position::Attacker, 80);
        paid.id = 2;
        paid.minutes = 90;
        paid.goals = 1;

        let snapshot = build_snapshot(
            &inputs_with(vec![free, paid], SeasonPhase::PreSeason),
            &test_config(),
            now(),
        )
        .unwrap();

        for bucket in snapshot.by_position.values() {
            assert!(bucket.iter().all(|p| p.price > 0.0));
        }
        assert_eq!(snapshot.by_position[&Position::Attacker].len(), 1);
    }

    #[test]
    fn x_value_is_exactly_xppg_over_price() {
        let mut player = raw_player(Position::Midfielder, 75);
        player.minutes = 360;
        player.goals = 2;
        player.assists = 3;
        player.total_points = 24;

        let snapshot = build_snapshot(
            &inputs_with(vec![player], SeasonPhase::PreSeason),
            &test_config(),
            now(),
        )
        .unwrap();

        let row = &snapshot.by_position[&Position::Midfielder][0];
        assert!((row.x_value - row.xppg / row.price).abs() < 1e-9);
        assert!((row.value - row.points / row.price).abs() < 1e-9);
    }

    #[test]
    fn buckets_sort_descending_by_x_value() {
        let mut weak = raw_player(Position::Attacker, 80);
        weak.minutes = 90;
        weak.goals = 0;
        let mut strong = raw_player(Position::Attacker, 80);
        strong.id = 2;
        strong.name = "Strong Player".to_string();
        strong.minutes = 90;
        strong.goals = 2;

        let snapshot = build_snapshot(
            &inputs_with(vec![weak, strong], SeasonPhase::PreSeason),
            &test_config(),
            now(),
        )
        .unwrap();

        let bucket = &snapshot.by_position[&Position::Attacker];
        assert_eq!(bucket[0].name, "Strong Player");
        assert!(bucket[0].x_value >= bucket[1].x_value);
    }

    #[test]
    fn all_excluded_is_a_failed_cycle() {
        let player = raw_player(Position::Attacker, 80); // zero minutes
        let result = build_snapshot(
            &inputs_with(vec![player], SeasonPhase::PreSeason),
            &test_config(),
            now(),
        );
        assert!(matches!(result, Err(RefreshError::NoEligiblePlayers)));
    }

    #[test]
    fn in_season_players_without_history_are_excluded() {
        let mut with_history = raw_player(Position::Attacker, 80);
        with_history.id = 1;
        let mut without = raw_player(Position::Attacker, 80);
        without.id = 2;

        let mut inputs = inputs_with(vec![with_history, without], SeasonPhase::InSeason);
        inputs.histories.insert(1, vec![record(1, 0.5, 5)]);

        let snapshot = build_snapshot(&inputs, &test_config(), now()).unwrap();
        assert_eq!(snapshot.by_position[&Position::Attacker].len(), 1);
    }

    #[test]
    fn rate_fields_are_non_negative() {
        // Junk negative upstream values get clamped in the history branch.
        let mut rec = record(1, -0.5, -2);
        rec.xa = -1.0;
        rec.xgc = -3.0;
        let rates = rates_from_history(Position::Midfielder, &[rec], 4).unwrap();
        assert!(rates.xg >= 0.0 && rates.xa >= 0.0 && rates.xgc >= 0.0);
        // points may legitimately be negative and is not clamped
        assert!((rates.points - (-2.0)).abs() < 1e-9);
    }
}
