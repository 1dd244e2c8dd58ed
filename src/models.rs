use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Player positions as encoded by the upstream `element_type` field (1-4).
///
/// Serialized as the plural bucket names the dashboard expects, which also
/// makes the variants usable directly as JSON map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "Goalkeepers")]
    Goalkeeper,
    #[serde(rename = "Defenders")]
    Defender,
    #[serde(rename = "Midfielders")]
    Midfielder,
    #[serde(rename = "Attackers")]
    Attacker,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Attacker,
    ];

    /// Upstream position codes. Codes outside 1-4 (e.g. managers) are not
    /// rankable and map to `None`.
    pub fn from_element_type(code: u8) -> Option<Self> {
        match code {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Attacker),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "Goalkeepers",
            Position::Defender => "Defenders",
            Position::Midfielder => "Midfielders",
            Position::Attacker => "Attackers",
        }
    }
}

/// Immutable upstream view of one player's season so far. Replaced wholesale
/// each refresh cycle.
#[derive(Debug, Clone)]
pub struct RawPlayer {
    pub id: u32,
    pub name: String,
    pub position: Position,
    pub team_id: u32,
    pub goals: u32,
    pub assists: u32,
    pub goals_conceded: u32,
    pub minutes: u32,
    pub saves: u32,
    pub bonus: u32,
    pub total_points: i32,
    /// Price in integer tenths, as served upstream.
    pub now_cost: i32,
}

impl RawPlayer {
    /// Price in whole currency units.
    pub fn price(&self) -> f64 {
        self.now_cost as f64 / 10.0
    }
}

/// One completed-fixture observation for one player, upstream supplied.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub xg: f64,
    pub xa: f64,
    pub xgc: f64,
    pub minutes: u32,
    pub bonus: u32,
    pub saves: u32,
    pub total_points: i32,
    pub kickoff: Option<DateTime<Utc>>,
}

/// A scheduled or completed fixture. Only consumed by the difficulty
/// calculator; fixtures with no kickoff time (unscheduled) are skipped there.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub id: u32,
    pub home_team: u32,
    pub away_team: u32,
    pub home_difficulty: u8,
    pub away_difficulty: u8,
    pub kickoff: Option<DateTime<Utc>>,
}

/// Derived per-player projection row, field names matching the dashboard
/// payload the original proxy served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedPlayer {
    pub name: String,
    pub team: String,
    pub position: Position,
    #[serde(rename = "xG")]
    pub xg: f64,
    #[serde(rename = "xA")]
    pub xa: f64,
    #[serde(rename = "xGC")]
    pub xgc: f64,
    pub bonus: f64,
    pub minutes: f64,
    pub saves: f64,
    #[serde(rename = "xPPG")]
    pub xppg: f64,
    /// Historical points per game.
    pub points: f64,
    pub price: f64,
    /// points / price.
    pub value: f64,
    /// xPPG / price, the primary ranking metric.
    #[serde(rename = "xValue")]
    pub x_value: f64,
    #[serde(rename = "pFDR")]
    pub past_fdr: Option<f64>,
    #[serde(rename = "fFDR")]
    pub future_fdr: Option<f64>,
}

/// One fully computed result set. Immutable once published: a refresh builds
/// a brand-new Snapshot and swaps the reference, never mutates in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    /// Players bucketed by position, each bucket sorted descending by xValue.
    pub by_position: BTreeMap<Position, Vec<ProjectedPlayer>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_codes_map_one_to_four() {
        assert_eq!(Position::from_element_type(1), Some(Position::Goalkeeper));
        assert_eq!(Position::from_element_type(4), Some(Position::Attacker));
        // Upstream added element_type 5 (managers); they are not rankable.
        assert_eq!(Position::from_element_type(5), None);
        assert_eq!(Position::from_element_type(0), None);
    }

    #[test]
    fn position_serializes_as_bucket_name() {
        assert_eq!(
            serde_json::to_string(&Position::Goalkeeper).unwrap(),
            "\"Goalkeepers\""
        );
    }

    #[test]
    fn price_converts_tenths() {
        let player = RawPlayer {
            id: 1,
            name: "Test Player".to_string(),
            position: Position::Midfielder,
            team_id: 1,
            goals: 0,
            assists: 0,
            goals_conceded: 0,
            minutes: 0,
            saves: 0,
            bonus: 0,
            total_points: 0,
            now_cost: 125,
        };
        assert!((player.price() - 12.5).abs() < 1e-9);
    }
}
