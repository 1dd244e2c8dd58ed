//! Projection engine: season-phase detection, fixture difficulty, and the
//! per-player expected-points model, assembled into one snapshot per
//! refresh cycle.

pub mod calculator;
pub mod fdr;
pub mod season;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::info;

use crate::cache::SnapshotSource;
use crate::config::Config;
use crate::error::RefreshError;
use crate::models::Snapshot;
use crate::scrapers::FplClient;
use calculator::SnapshotInputs;
use season::SeasonPhase;

/// The full fetch-and-compute pipeline for one refresh cycle: upstream
/// fetches, phase detection, then snapshot assembly. Owned by the cache and
/// run single-flight.
pub struct ProjectionPipeline {
    client: FplClient,
    config: Config,
}

impl ProjectionPipeline {
    pub fn new(client: FplClient, config: Config) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl SnapshotSource for ProjectionPipeline {
    async fn build(&self) -> Result<Snapshot, RefreshError> {
        let now = Utc::now();

        let (players, teams) = self.client.fetch_bootstrap().await?;
        let fixtures = self.client.fetch_fixtures().await?;
        let phase = season::detect(&players, &fixtures, now, self.config.min_started_share);
        info!(
            ?phase,
            players = players.len(),
            fixtures = fixtures.len(),
            "building projection snapshot"
        );

        // Per-player history is only needed for the recent-form branch.
        let histories = match phase {
            SeasonPhase::InSeason => {
                let ids: Vec<u32> = players.iter().map(|p| p.id).collect();
                self.client.fetch_histories(&ids).await
            }
            SeasonPhase::PreSeason => HashMap::new(),
        };

        calculator::build_snapshot(
            &SnapshotInputs {
                players,
                teams,
                fixtures,
                histories,
                phase,
            },
            &self.config,
            now,
        )
    }
}
