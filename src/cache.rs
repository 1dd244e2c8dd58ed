//! Snapshot cache with stale-while-revalidate refresh.
//!
//! The held snapshot is immutable and published by swapping an Arc
//! (arc-swap), so readers never observe a half-built result and the only
//! mutually exclusive step is the pointer swap itself — no lock is held
//! across the slow fetch+compute. Refresh cycles are single-flight: an
//! AtomicBool guard for background refreshes once a snapshot exists, and a
//! watch channel for cold-start populate fan-out so every concurrent first
//! reader observes the same completed snapshot or the same failure.
//!
//! A failed cycle never touches the held snapshot or its timestamp; it is
//! recorded for observability and the old data keeps being served.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::RefreshError;
use crate::models::Snapshot;

/// Anything that can produce a complete snapshot. The production source is
/// `projection::ProjectionPipeline`; tests inject stubs.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn build(&self) -> Result<Snapshot, RefreshError>;
}

/// Outcome of one cache read.
#[derive(Debug)]
pub enum CacheRead {
    /// A snapshot is available. It may be past the freshness threshold, in
    /// which case a background refresh has been scheduled (`refreshing`).
    Ready {
        snapshot: Arc<Snapshot>,
        refreshing: bool,
    },
    /// Cold start: the first populate is still running after the bounded
    /// wait. No snapshot has ever been published.
    Populating,
    /// Cold start: the populate cycle failed and nothing has ever been
    /// published. Every waiter of that cycle receives this same error.
    Failed(RefreshError),
}

/// Cheap-to-clone handle; all clones share the same cache state.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    source: Arc<dyn SnapshotSource>,
    current: ArcSwapOption<Snapshot>,
    /// Single-flight guard for background refreshes.
    refreshing: AtomicBool,
    freshness: Duration,
    cold_wait: Duration,
    /// Some while a cold populate is in flight; waiters clone the receiver.
    populate: Mutex<Option<watch::Receiver<bool>>>,
    last_failure: Mutex<Option<RefreshError>>,
    /// Completed cycle counter (success or failure), bumped after each cycle
    /// so tests can await refresh completion deterministically.
    cycles_tx: watch::Sender<u64>,
    /// Upstream fetch cycles started, for observability and tests.
    fetches: AtomicU64,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn SnapshotSource>, freshness: Duration, cold_wait: Duration) -> Self {
        let (cycles_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(CacheInner {
                source,
                current: ArcSwapOption::empty(),
                refreshing: AtomicBool::new(false),
                freshness,
                cold_wait,
                populate: Mutex::new(None),
                last_failure: Mutex::new(None),
                cycles_tx,
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// The read path. Never blocks on a refresh once a snapshot exists:
    /// stale data is served immediately while at most one background cycle
    /// rebuilds it.
    pub async fn read(&self) -> CacheRead {
        if let Some(snapshot) = self.inner.current.load_full() {
            let age = Utc::now()
                .signed_duration_since(snapshot.generated_at)
                .to_std()
                .unwrap_or_default();
            if age > self.inner.freshness {
                self.trigger_refresh();
            }
            return CacheRead::Ready {
                snapshot,
                refreshing: self.inner.refreshing.load(Ordering::SeqCst),
            };
        }
        self.populate_and_wait().await
    }

    /// Schedule one background refresh if none is in flight. Returns whether
    /// this call started a cycle.
    pub fn trigger_refresh(&self) -> bool {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.run_cycle().await {
                *cache.inner.last_failure.lock() = Some(e);
            }
            cache.inner.refreshing.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Cold start: join (or start) the single-flight populate and block up
    /// to `cold_wait` for it. Exactly one fetch/compute runs no matter how
    /// many readers arrive; all of them see the same outcome.
    async fn populate_and_wait(&self) -> CacheRead {
        let mut rx = {
            let mut slot = self.inner.populate.lock();
            // The populate may have finished while we waited for the lock.
            if let Some(snapshot) = self.inner.current.load_full() {
                return CacheRead::Ready {
                    snapshot,
                    refreshing: false,
                };
            }
            match slot.as_ref() {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(false);
                    *slot = Some(rx.clone());
                    let cache = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = cache.run_cycle().await {
                            *cache.inner.last_failure.lock() = Some(e);
                        }
                        *cache.inner.populate.lock() = None;
                        let _ = tx.send(true);
                    });
                    rx
                }
            }
        };

        let completed = tokio::time::timeout(self.inner.cold_wait, async {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok();

        if let Some(snapshot) = self.inner.current.load_full() {
            return CacheRead::Ready {
                snapshot,
                refreshing: false,
            };
        }
        if !completed {
            return CacheRead::Populating;
        }
        CacheRead::Failed(self.inner.last_failure.lock().clone().unwrap_or_else(|| {
            RefreshError::UpstreamUnavailable("populate produced no snapshot".to_string())
        }))
    }

    /// One full fetch-and-compute cycle. Success swaps the snapshot pointer
    /// atomically; failure leaves the previous snapshot untouched.
    async fn run_cycle(&self) -> Result<(), RefreshError> {
        let cycle = self.inner.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let started = std::time::Instant::now();
        info!(cycle, "refresh cycle started");

        let outcome = match self.inner.source.build().await {
            Ok(snapshot) => {
                info!(
                    cycle,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    generated_at = %snapshot.generated_at,
                    "refresh cycle complete"
                );
                self.inner.current.store(Some(Arc::new(snapshot)));
                *self.inner.last_failure.lock() = None;
                Ok(())
            }
            Err(e) => {
                warn!(cycle, error = %e, "refresh cycle failed; keeping last good snapshot");
                Err(e)
            }
        };

        self.inner.cycles_tx.send_modify(|c| *c += 1);
        outcome
    }

    /// Whether a background refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::SeqCst)
    }

    /// Number of upstream fetch cycles started since process start.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Completed cycles (success or failure).
    pub fn completed_cycles(&self) -> u64 {
        *self.inner.cycles_tx.borrow()
    }

    /// Await until at least `n` cycles have completed.
    pub async fn wait_for_cycles(&self, n: u64) {
        let mut rx = self.inner.cycles_tx.subscribe();
        while *rx.borrow_and_update() < n {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// The most recent failure, if the latest cycle failed.
    pub fn last_failure(&self) -> Option<RefreshError> {
        self.inner.last_failure.lock().clone()
    }
}
