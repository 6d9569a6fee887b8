// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic re-evaluation of groups that may have become completable.
//!
//! The [`SweepRunner`] retries merges for groups whose final segment may
//! have arrived after the triggering ingest's synchronous attempt, and
//! purges groups that stayed incomplete past the configured timeout. A
//! failed pass logs and continues after a backoff; it never terminates the
//! loop. The task stops cleanly when its [`CancellationToken`] fires.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weft_config::model::{ReassemblyConfig, SweepConfig};
use weft_core::WeftError;
use weft_core::types::MergeOutcome;

use crate::engine::ReassemblyEngine;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Unmerged groups older than the recheck window.
    pub candidates: usize,
    /// Groups merged by this pass.
    pub merged: usize,
    /// Groups purged by this pass.
    pub purged: usize,
}

/// Runs merge retries and purges on a fixed interval.
pub struct SweepRunner {
    engine: Arc<ReassemblyEngine>,
    reassembly: ReassemblyConfig,
    sweep: SweepConfig,
}

impl SweepRunner {
    pub fn new(
        engine: Arc<ReassemblyEngine>,
        reassembly: ReassemblyConfig,
        sweep: SweepConfig,
    ) -> Self {
        Self {
            engine,
            reassembly,
            sweep,
        }
    }

    /// One sweep pass: retry merges for recheck candidates, then purge
    /// groups past the long timeout.
    ///
    /// A merge failure on one group is logged and does not stop the pass.
    pub async fn sweep_once(&self) -> Result<SweepReport, WeftError> {
        let recheck = Duration::from_secs(self.reassembly.recheck_after_secs);
        let candidates = self.engine.find_incomplete_groups(recheck).await?;

        let mut merged = 0;
        for key in &candidates {
            match self.engine.try_merge(key).await {
                Ok(MergeOutcome::Merged(_)) => merged += 1,
                Ok(_) => {}
                Err(e) => warn!(group = %key, error = %e, "merge retry failed"),
            }
        }

        let purge_after = Duration::from_secs(self.reassembly.purge_after_secs);
        let purged = self.engine.purge_incomplete(purge_after).await?;

        Ok(SweepReport {
            candidates: candidates.len(),
            merged,
            purged,
        })
    }

    /// Run sweep passes until the token is cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.sweep.interval_secs));
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.merged > 0 || report.purged > 0 => {
                            info!(
                                candidates = report.candidates,
                                merged = report.merged,
                                purged = report.purged,
                                "sweep pass complete"
                            );
                        }
                        Ok(report) => {
                            debug!(candidates = report.candidates, "sweep pass: nothing to do");
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                backoff_secs = self.sweep.failure_backoff_secs,
                                "sweep pass failed"
                            );
                            tokio::time::sleep(Duration::from_secs(
                                self.sweep.failure_backoff_secs,
                            ))
                            .await;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("sweep task shutting down");
                    break;
                }
            }
        }
    }

    /// Fire one reconciliation pass after `delay`, unless cancelled first.
    ///
    /// Scheduled once shortly after a bulk import completes. Returns the
    /// number of groups merged, or `None` if cancelled or failed.
    pub async fn reconcile_after(
        &self,
        delay: Duration,
        cancel: CancellationToken,
    ) -> Option<usize> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                match self.engine.reconcile().await {
                    Ok(merged) => {
                        if merged > 0 {
                            info!(merged, "post-import reconciliation merged groups");
                        }
                        Some(merged)
                    }
                    Err(e) => {
                        warn!(error = %e, "post-import reconciliation failed");
                        None
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!("reconciliation cancelled before firing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::SegmentStore;
    use weft_test_utils::MemoryStore;
    use weft_test_utils::segments::{segment, segment_at};

    fn runner(store: Arc<MemoryStore>) -> SweepRunner {
        let engine = Arc::new(ReassemblyEngine::new(store as Arc<dyn SegmentStore>));
        SweepRunner::new(
            engine,
            ReassemblyConfig {
                recheck_after_secs: 600,
                purge_after_secs: 1800,
            },
            SweepConfig::default(),
        )
    }

    #[tokio::test]
    async fn sweep_merges_recheck_candidates_and_purges_dead_groups() {
        let store = Arc::new(MemoryStore::new());

        // Complete-but-unmerged group, old enough to recheck.
        store
            .upsert_segment(&segment_at("5000123", 1, 1, 1, 2, "Hello ", 1_000))
            .await
            .unwrap();
        store
            .upsert_segment(&segment_at("5000123", 1, 1, 2, 2, "World", 1_001))
            .await
            .unwrap();

        // Incomplete group past the purge window.
        store
            .upsert_segment(&segment_at("5000999", 2, 1, 1, 3, "x", 1_000))
            .await
            .unwrap();

        let runner = runner(store.clone());
        let report = runner.sweep_once().await.unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(report.purged, 1);
        assert_eq!(store.merged_count().await, 1);
        assert_eq!(store.segment_count().await, 2, "merged segments are kept");
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_groups_alone() {
        let store = Arc::new(MemoryStore::new());

        // Fresh incomplete group, well inside the recheck window.
        store
            .upsert_segment(&segment("5000123", 1, 1, 1, 2, "x"))
            .await
            .unwrap();

        let runner = runner(store.clone());
        let report = runner.sweep_once().await.unwrap();

        assert_eq!(report.candidates, 0);
        assert_eq!(report.purged, 0);
        assert_eq!(store.segment_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_cleanly_on_cancellation() {
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(runner(store));
        let cancel = CancellationToken::new();

        let task = {
            let runner = runner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { runner.run(cancel).await })
        };

        // Let a few ticks elapse, then cancel.
        tokio::time::sleep(Duration::from_secs(95)).await;
        cancel.cancel();
        task.await.expect("sweep task must not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_after_fires_once_after_delay() {
        let store = Arc::new(MemoryStore::new());

        // Complete-but-unmerged group waiting for reconciliation.
        store
            .upsert_segment(&segment_at("5000123", 1, 1, 1, 2, "a", 1_000))
            .await
            .unwrap();
        store
            .upsert_segment(&segment_at("5000123", 1, 1, 2, 2, "b", 1_001))
            .await
            .unwrap();

        let runner = runner(store.clone());
        let merged = runner
            .reconcile_after(Duration::from_secs(15), CancellationToken::new())
            .await;

        assert_eq!(merged, Some(1));
        assert_eq!(store.merged_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_after_respects_cancellation() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_segment(&segment_at("5000123", 1, 1, 1, 2, "a", 1_000))
            .await
            .unwrap();

        let runner = Arc::new(runner(store.clone()));
        let cancel = CancellationToken::new();

        let task = {
            let runner = runner.clone();
            let cancel = cancel.clone();
            tokio::spawn(
                async move { runner.reconcile_after(Duration::from_secs(60), cancel).await },
            )
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), None);
    }
}
