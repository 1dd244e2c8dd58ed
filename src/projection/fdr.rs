use chrono::{DateTime, Utc};

use crate::models::Fixture;

/// Past- and future-window average fixture difficulty for one team.
///
/// Takes the `window` most recent completed fixtures and the `window`
/// soonest upcoming ones, averaging the difficulty rating from this team's
/// side of each fixture. An empty partition yields `None`, never zero — a
/// zero would bias the rankings. Equal kickoff times tie-break by ascending
/// fixture id so the selection is stable.
pub fn difficulty(
    team_id: u32,
    fixtures: &[Fixture],
    now: DateTime<Utc>,
    window: usize,
) -> (Option<f64>, Option<f64>) {
    let mut past: Vec<&Fixture> = Vec::new();
    let mut future: Vec<&Fixture> = Vec::new();

    for fixture in fixtures {
        if fixture.home_team != team_id && fixture.away_team != team_id {
            continue;
        }
        let Some(kickoff) = fixture.kickoff else {
            continue; // unscheduled
        };
        if kickoff < now {
            past.push(fixture);
        } else {
            future.push(fixture);
        }
    }

    past.sort_by(|a, b| b.kickoff.cmp(&a.kickoff).then(a.id.cmp(&b.id)));
    future.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));

    (
        window_average(team_id, &past, window),
        window_average(team_id, &future, window),
    )
}

fn window_average(team_id: u32, fixtures: &[&Fixture], window: usize) -> Option<f64> {
    let selected = &fixtures[..fixtures.len().min(window)];
    if selected.is_empty() {
        return None;
    }
    let sum: u32 = selected
        .iter()
        .map(|f| {
            if f.home_team == team_id {
                f.home_difficulty as u32
            } else {
                f.away_difficulty as u32
            }
        })
        .sum();
    Some(sum as f64 / selected.len() as f64)
}
