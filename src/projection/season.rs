use chrono::{DateTime, Utc};

use crate::models::{Fixture, RawPlayer};

/// Which projection model branch applies for the whole refresh cycle.
///
/// The choice is global per cycle, never per player, so one ranking table
/// never mixes the two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonPhase {
    /// No usable match sample yet; project from season-cumulative totals.
    PreSeason,
    /// Enough of the league has played; project from recent match history.
    InSeason,
}

/// Classify the season phase. `InSeason` requires at least one completed
/// fixture and at least `min_started_share` of players with non-zero
/// cumulative minutes. Pure function of its inputs.
pub fn detect(
    players: &[RawPlayer],
    fixtures: &[Fixture],
    now: DateTime<Utc>,
    min_started_share: f64,
) -> SeasonPhase {
    let any_completed = fixtures
        .iter()
        .any(|f| f.kickoff.is_some_and(|k| k < now));
    if !any_completed || players.is_empty() {
        return SeasonPhase::PreSeason;
    }

    let started = players.iter().filter(|p| p.minutes > 0).count();
    let share = started as f64 / players.len() as f64;
    if share >= min_started_share {
        SeasonPhase::InSeason
    } else {
        SeasonPhase::PreSeason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use chrono::TimeZone;

    fn player(id: u32, minutes: u32) -> RawPlayer {
        RawPlayer {
            id,
            name: format!("Player {id}"),
            position: Position::Midfielder,
            team_id: 1,
            goals: 0,
            assists: 0,
            goals_conceded: 0,
            minutes,
            saves: 0,
            bonus: 0,
            total_points: 0,
            now_cost: 50,
        }
    }

    fn fixture(id: u32, kickoff: Option<DateTime<Utc>>) -> Fixture {
        Fixture {
            id,
            home_team: 1,
            away_team: 2,
            home_difficulty: 3,
            away_difficulty: 3,
            kickoff,
        }
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 16, hour, 0, 0).unwrap()
    }

    #[test]
    fn pre_season_when_no_fixture_completed() {
        let players = vec![player(1, 90), player(2, 90)];
        let fixtures = vec![fixture(1, Some(ts(15)))];
        assert_eq!(
            detect(&players, &fixtures, ts(10), 0.1),
            SeasonPhase::PreSeason
        );
    }

    #[test]
    fn pre_season_when_too_few_players_started() {
        let mut players: Vec<_> = (1..=19).map(|id| player(id, 0)).collect();
        players.push(player(20, 90)); // 5% started, below the 10% floor
        let fixtures = vec![fixture(1, Some(ts(10)))];
        assert_eq!(
            detect(&players, &fixtures, ts(15), 0.1),
            SeasonPhase::PreSeason
        );
    }

    #[test]
    fn in_season_when_fixture_done_and_share_met() {
        let players = vec![player(1, 90), player(2, 0), player(3, 45)];
        let fixtures = vec![fixture(1, Some(ts(10))), fixture(2, None)];
        assert_eq!(
            detect(&players, &fixtures, ts(15), 0.1),
            SeasonPhase::InSeason
        );
    }

    #[test]
    fn unscheduled_fixtures_do_not_count_as_completed() {
        let players = vec![player(1, 90)];
        let fixtures = vec![fixture(1, None)];
        assert_eq!(
            detect(&players, &fixtures, ts(15), 0.1),
            SeasonPhase::PreSeason
        );
    }
}
