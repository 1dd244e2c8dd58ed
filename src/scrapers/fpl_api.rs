//! Fantasy Premier League API client.
//!
//! Three read-only endpoints feed the projection engine:
//! - `bootstrap-static/` — players, teams, season-cumulative totals
//! - `fixtures/` — full fixture list with difficulty ratings
//! - `element-summary/{id}/` — per-player match history (in-season only)
//!
//! Upstream quirks handled here: expected-goals figures arrive as JSON
//! strings, kickoff times can be null for unscheduled fixtures, and the
//! element list contains non-player entries (managers) that are skipped.

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::RefreshError;
use crate::models::{Fixture, MatchRecord, Position, RawPlayer};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

pub struct FplClient {
    http: Client,
    base: String,
    history_concurrency: usize,
}

impl FplClient {
    pub fn new(
        base: impl Into<String>,
        timeout: Duration,
        history_concurrency: usize,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("fplvalue-backend/0.1")
            .build()?;
        Ok(Self {
            http,
            base: base.into(),
            history_concurrency: history_concurrency.max(1),
        })
    }

    /// Bulk player/team listing. Elements with unknown position codes are
    /// skipped rather than failing the cycle.
    pub async fn fetch_bootstrap(
        &self,
    ) -> Result<(Vec<RawPlayer>, HashMap<u32, String>), RefreshError> {
        let url = format!("{}/bootstrap-static/", self.base);
        let bootstrap: BootstrapResponse = self.get_json(&url).await?;

        let teams: HashMap<u32, String> = bootstrap
            .teams
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();

        let mut players = Vec::with_capacity(bootstrap.elements.len());
        for element in bootstrap.elements {
            let Some(position) = Position::from_element_type(element.element_type) else {
                debug!(
                    player_id = element.id,
                    element_type = element.element_type,
                    "skipping non-rankable element"
                );
                continue;
            };
            players.push(RawPlayer {
                id: element.id,
                name: format!("{} {}", element.first_name, element.second_name),
                position,
                team_id: element.team,
                goals: element.goals_scored,
                assists: element.assists,
                goals_conceded: element.goals_conceded,
                minutes: element.minutes,
                saves: element.saves,
                bonus: element.bonus,
                total_points: element.total_points,
                now_cost: element.now_cost,
            });
        }

        if players.is_empty() {
            return Err(RefreshError::UpstreamMalformed(
                "bootstrap contained no rankable players".to_string(),
            ));
        }
        debug!(players = players.len(), teams = teams.len(), "bootstrap fetched");
        Ok((players, teams))
    }

    pub async fn fetch_fixtures(&self) -> Result<Vec<Fixture>, RefreshError> {
        let url = format!("{}/fixtures/", self.base);
        let fixtures: Vec<FixtureDto> = self.get_json(&url).await?;
        Ok(fixtures
            .into_iter()
            .map(|f| Fixture {
                id: f.id,
                home_team: f.team_h,
                away_team: f.team_a,
                home_difficulty: f.team_h_difficulty,
                away_difficulty: f.team_a_difficulty,
                kickoff: f.kickoff_time,
            })
            .collect())
    }

    /// Current-season match history for one player, oldest first as upstream
    /// serves it.
    pub async fn fetch_history(&self, player_id: u32) -> Result<Vec<MatchRecord>, RefreshError> {
        let url = format!("{}/element-summary/{}/", self.base, player_id);
        let summary: ElementSummaryDto = self.get_json(&url).await?;
        Ok(summary
            .history
            .into_iter()
            .map(|h| MatchRecord {
                xg: h.expected_goals,
                xa: h.expected_assists,
                xgc: h.expected_goals_conceded,
                minutes: h.minutes,
                bonus: h.bonus,
                saves: h.saves,
                total_points: h.total_points,
                kickoff: h.kickoff_time,
            })
            .collect())
    }

    /// Fetch histories for many players with bounded concurrency. A single
    /// player's failure is logged and that player omitted (it then falls to
    /// the zero-records exclusion rule); it does not fail the cycle.
    pub async fn fetch_histories(&self, ids: &[u32]) -> HashMap<u32, Vec<MatchRecord>> {
        let results: Vec<(u32, Option<Vec<MatchRecord>>)> = stream::iter(ids.iter().copied())
            .map(|id| async move {
                match self.fetch_history(id).await {
                    Ok(history) => (id, Some(history)),
                    Err(e) => {
                        warn!(player_id = id, error = %e, "history fetch failed, skipping player");
                        (id, None)
                    }
                }
            })
            .buffer_unordered(self.history_concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(id, history)| history.map(|h| (id, h)))
            .collect()
    }

    /// GET + JSON decode with bounded retry and exponential backoff on
    /// transport-level failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RefreshError> {
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut last_err = String::new();

        for attempt in 1..=MAX_RETRIES {
            match self.http.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            RefreshError::UpstreamMalformed(format!("{url}: {e}"))
                        });
                    }
                    last_err = format!("{url}: http {status}");
                    if !(status.is_server_error() || status.as_u16() == 429) {
                        return Err(RefreshError::UpstreamUnavailable(last_err));
                    }
                }
                Err(e) => {
                    last_err = format!("{url}: {e}");
                }
            }
            if attempt < MAX_RETRIES {
                debug!(url, attempt, "upstream request failed, backing off: {}", last_err);
                sleep(backoff).await;
                backoff *= 2;
            }
        }
        Err(RefreshError::UpstreamUnavailable(last_err))
    }
}

// ===== Upstream payload shapes =====

#[derive(Debug, Deserialize)]
struct BootstrapResponse {
    elements: Vec<ElementDto>,
    teams: Vec<TeamDto>,
}

#[derive(Debug, Deserialize)]
struct TeamDto {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ElementDto {
    id: u32,
    first_name: String,
    second_name: String,
    element_type: u8,
    team: u32,
    now_cost: i32,
    #[serde(default)]
    total_points: i32,
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    goals_scored: u32,
    #[serde(default)]
    assists: u32,
    #[serde(default)]
    goals_conceded: u32,
    #[serde(default)]
    saves: u32,
    #[serde(default)]
    bonus: u32,
}

#[derive(Debug, Deserialize)]
struct FixtureDto {
    id: u32,
    team_h: u32,
    team_a: u32,
    #[serde(default)]
    team_h_difficulty: u8,
    #[serde(default)]
    team_a_difficulty: u8,
    #[serde(default)]
    kickoff_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ElementSummaryDto {
    #[serde(default)]
    history: Vec<HistoryEntryDto>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntryDto {
    #[serde(default, deserialize_with = "de_flexible_f64")]
    expected_goals: f64,
    #[serde(default, deserialize_with = "de_flexible_f64")]
    expected_assists: f64,
    #[serde(default, deserialize_with = "de_flexible_f64")]
    expected_goals_conceded: f64,
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    bonus: u32,
    #[serde(default)]
    saves: u32,
    #[serde(default)]
    total_points: i32,
    #[serde(default)]
    kickoff_time: Option<DateTime<Utc>>,
}

/// Upstream serializes expected-goals figures as strings ("0.45"); accept
/// both string and number, treating null/empty as zero.
fn de_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(0.0),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => {
            if s.is_empty() {
                Ok(0.0)
            } else {
                s.parse::<f64>().map_err(serde::de::Error::custom)
            }
        }
        _ => Ok(0.0),
    }
}
