// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The multipart reassembly engine.
//!
//! Receives individual segments, tracks completion per group, and merges
//! completed groups into exactly one record each. The store is the single
//! source of truth: every evaluation re-reads it, so redundant and
//! concurrent invocations converge on the same outcome. The merge window
//! itself is guarded per group key, with the store's uniqueness constraint
//! as the second line of defense.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use weft_core::types::{GroupKey, IngestResult, MergeOutcome, MergedMessage, Segment};
use weft_core::{SegmentStore, WeftError};

/// Reassembles multipart segments into complete logical messages.
pub struct ReassemblyEngine {
    store: Arc<dyn SegmentStore>,
    merge_locks: DashMap<GroupKey, Arc<Mutex<()>>>,
}

impl ReassemblyEngine {
    /// Create an engine over the given store.
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self {
            store,
            merge_locks: DashMap::new(),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    /// Ingest one segment.
    ///
    /// Single-part messages bypass grouping and are stored directly as
    /// complete records. Multi-part segments are made durable first, then
    /// the owning group's completeness is evaluated synchronously.
    ///
    /// A storage failure surfaces as `Err`; the segment source is expected
    /// to redeliver, and a second ingest of the same segment is idempotent
    /// to the merge outcome.
    pub async fn ingest(&self, segment: Segment) -> Result<IngestResult, WeftError> {
        validate(&segment)?;

        if segment.is_single_part() {
            let message = single_part_message(&segment);
            let inserted = self.store.insert_merged(&message).await?;
            if !inserted {
                debug!(group = %message.group_key, "single-part redelivery, record already stored");
            }
            return Ok(IngestResult::StoredAsComplete(message));
        }

        self.store.upsert_segment(&segment).await?;
        let key = segment.group_key();
        debug!(
            group = %key,
            part = segment.part_index,
            of = segment.part_count,
            "segment stored"
        );

        match self.try_merge(&key).await? {
            MergeOutcome::NotYetComplete => Ok(IngestResult::StoredIncomplete),
            MergeOutcome::AlreadyMerged => Ok(IngestResult::AlreadyMerged),
            MergeOutcome::Merged(message) => Ok(IngestResult::StoredAndMerged(message)),
        }
    }

    /// Ingest a batch sequentially, returning per-segment outcomes.
    ///
    /// Used by bulk import paths; one failing segment does not abort the
    /// rest of the batch.
    pub async fn ingest_many(
        &self,
        segments: Vec<Segment>,
    ) -> Vec<Result<IngestResult, WeftError>> {
        let mut results = Vec::with_capacity(segments.len());
        for segment in segments {
            results.push(self.ingest(segment).await);
        }
        results
    }

    /// Evaluate a group's completeness and merge it if ready.
    ///
    /// Re-entrant and safe to invoke redundantly: after every ingest, from
    /// the periodic sweep, and from post-import reconciliation, possibly
    /// concurrently on the same key. At most one merged record ever exists
    /// per group.
    pub async fn try_merge(&self, key: &GroupKey) -> Result<MergeOutcome, WeftError> {
        if self.store.merged_exists(key).await? {
            return Ok(MergeOutcome::AlreadyMerged);
        }

        let segments = self.store.segments_for_group(key).await?;
        let Some(expected) = expected_part_count(key, &segments) else {
            return Ok(MergeOutcome::NotYetComplete);
        };

        let by_index = first_seen_by_index(&segments);
        if !(1..=expected).all(|n| by_index.contains_key(&n)) {
            return Ok(MergeOutcome::NotYetComplete);
        }

        // Exclusive window per group: the check-then-insert below must not
        // interleave with another caller working the same key.
        let lock = self
            .merge_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = lock.lock().await;

        if self.store.merged_exists(key).await? {
            drop(guard);
            self.merge_locks.remove(key);
            return Ok(MergeOutcome::AlreadyMerged);
        }

        let body: String = (1..=expected)
            .filter_map(|n| by_index.get(&n))
            .map(|seg| seg.payload.as_str())
            .collect();
        let message = MergedMessage {
            id: key.merged_id(),
            sender: key.sender.clone(),
            body,
            completed_at: now_millis(),
            group_key: key.canonical(),
            is_multipart: true,
        };

        let inserted = self.store.insert_merged(&message).await?;
        drop(guard);
        // The lock entry is removed only once a merged row exists for the
        // key; late callers fall through to the store's uniqueness check.
        self.merge_locks.remove(key);

        if inserted {
            info!(group = %key, parts = expected, "group merged");
            Ok(MergeOutcome::Merged(message))
        } else {
            Ok(MergeOutcome::AlreadyMerged)
        }
    }

    /// Keys of unmerged groups whose oldest segment is older than
    /// `older_than`. Pure read; no side effects.
    pub async fn find_incomplete_groups(
        &self,
        older_than: Duration,
    ) -> Result<Vec<GroupKey>, WeftError> {
        let cutoff = now_millis() - older_than.as_millis() as i64;
        self.store.stale_groups(cutoff).await
    }

    /// Delete groups still incomplete after `older_than`.
    ///
    /// Returns the number of groups purged. Each candidate gets one final
    /// merge attempt first, so a complete group whose trigger was lost is
    /// recovered rather than destroyed. Once purged, a late arrival of the
    /// missing part starts a fresh group; it does not resurrect history.
    pub async fn purge_incomplete(&self, older_than: Duration) -> Result<usize, WeftError> {
        let candidates = self.find_incomplete_groups(older_than).await?;
        let mut purged = 0;
        for key in candidates {
            match self.try_merge(&key).await? {
                MergeOutcome::Merged(_) | MergeOutcome::AlreadyMerged => continue,
                MergeOutcome::NotYetComplete => {}
            }
            let deleted = self.store.delete_group(&key).await?;
            if deleted > 0 {
                purged += 1;
                info!(group = %key, segments = deleted, "purged incomplete group");
            }
        }
        Ok(purged)
    }

    /// Retry every unmerged group regardless of age.
    ///
    /// Returns the number of groups merged. Run once shortly after a bulk
    /// import, when the importing pass may have raced its own merge
    /// triggers.
    pub async fn reconcile(&self) -> Result<usize, WeftError> {
        let candidates = self.store.stale_groups(i64::MAX).await?;
        let mut merged = 0;
        for key in &candidates {
            if matches!(self.try_merge(key).await?, MergeOutcome::Merged(_)) {
                merged += 1;
            }
        }
        debug!(scanned = candidates.len(), merged, "reconciliation pass complete");
        Ok(merged)
    }
}

/// Reject malformed segments before they can corrupt completeness scans.
fn validate(segment: &Segment) -> Result<(), WeftError> {
    if segment.part_count == 0 {
        return Err(WeftError::InvalidSegment {
            reason: "part_count must be positive".to_string(),
        });
    }
    if segment.part_index < 1 || segment.part_index > segment.part_count {
        return Err(WeftError::InvalidSegment {
            reason: format!(
                "part_index {} outside [1, {}]",
                segment.part_index, segment.part_count
            ),
        });
    }
    Ok(())
}

/// The group's expected part count, taken from the segment with the
/// numerically largest `part_index`. Disagreement between segments is a
/// data-quality warning, not an error.
fn expected_part_count(key: &GroupKey, segments: &[Segment]) -> Option<u32> {
    let latest = segments.iter().max_by_key(|s| s.part_index)?;
    let distinct: HashSet<u32> = segments.iter().map(|s| s.part_count).collect();
    if distinct.len() > 1 {
        warn!(
            group = %key,
            counts = ?distinct,
            trusted = latest.part_count,
            "segments disagree on part_count"
        );
    }
    Some(latest.part_count)
}

/// Index the segments by `part_index`, first stored wins on duplicates.
fn first_seen_by_index(segments: &[Segment]) -> BTreeMap<u32, &Segment> {
    let mut by_index = BTreeMap::new();
    for segment in segments {
        by_index.entry(segment.part_index).or_insert(segment);
    }
    by_index
}

fn single_part_message(segment: &Segment) -> MergedMessage {
    let key = segment.group_key();
    MergedMessage {
        id: key.merged_id(),
        sender: segment.sender.clone(),
        body: segment.payload.clone(),
        completed_at: now_millis(),
        group_key: key.canonical(),
        is_multipart: false,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_test_utils::segments::{segment, segment_at};
    use weft_test_utils::{FlakyStore, MemoryStore};

    fn engine() -> (ReassemblyEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReassemblyEngine::new(store.clone()), store)
    }

    #[tokio::test]
    async fn hello_world_scenario() {
        let (engine, _store) = engine();

        let first = engine
            .ingest(segment("5000123", 42, 7, 2, 2, "World"))
            .await
            .unwrap();
        assert_eq!(first, IngestResult::StoredIncomplete);

        let second = engine
            .ingest(segment("5000123", 42, 7, 1, 2, "Hello "))
            .await
            .unwrap();
        let IngestResult::StoredAndMerged(message) = second else {
            panic!("expected merge, got {second:?}");
        };
        assert_eq!(message.body, "Hello World");
        assert_eq!(message.sender, "5000123");
        assert!(message.is_multipart);
    }

    #[tokio::test]
    async fn scrambled_delivery_concatenates_in_index_order() {
        let (engine, _store) = engine();

        // Delivery order 3,1,5,2,4 with payloads A..E assigned in that
        // order; the merged body reads by index, so index 1 ("B") first.
        for (index, payload) in [(3, "A"), (1, "B"), (5, "C"), (2, "D"), (4, "E")] {
            engine
                .ingest(segment("5000123", 42, 7, index, 5, payload))
                .await
                .unwrap();
        }

        let key = GroupKey {
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
        };
        let merged = engine.store().get_merged(&key).await.unwrap().unwrap();
        assert_eq!(merged.body, "BDAEC");
    }

    #[tokio::test]
    async fn single_part_bypasses_grouping() {
        let (engine, store) = engine();

        let result = engine
            .ingest(segment("5000123", 42, 7, 1, 1, "short message"))
            .await
            .unwrap();
        let IngestResult::StoredAsComplete(message) = result else {
            panic!("expected StoredAsComplete, got {result:?}");
        };
        assert!(!message.is_multipart);
        assert_eq!(message.body, "short message");
        // No segment row was written.
        assert_eq!(store.segment_count().await, 0);
        assert_eq!(store.merged_count().await, 1);
    }

    #[tokio::test]
    async fn single_part_redelivery_is_idempotent() {
        let (engine, store) = engine();
        let seg = segment("5000123", 42, 7, 1, 1, "hi");

        let first = engine.ingest(seg.clone()).await.unwrap();
        let second = engine.ingest(seg).await.unwrap();
        assert!(matches!(first, IngestResult::StoredAsComplete(_)));
        assert!(matches!(second, IngestResult::StoredAsComplete(_)));
        assert_eq!(store.merged_count().await, 1);
    }

    #[tokio::test]
    async fn malformed_segments_are_rejected_without_storing() {
        let (engine, store) = engine();

        let zero_count = segment("5000123", 42, 7, 1, 0, "x");
        assert!(matches!(
            engine.ingest(zero_count).await,
            Err(WeftError::InvalidSegment { .. })
        ));

        let index_too_high = segment("5000123", 42, 7, 4, 3, "x");
        assert!(matches!(
            engine.ingest(index_too_high).await,
            Err(WeftError::InvalidSegment { .. })
        ));

        let index_zero = segment("5000123", 42, 7, 0, 3, "x");
        assert!(matches!(
            engine.ingest(index_zero).await,
            Err(WeftError::InvalidSegment { .. })
        ));

        assert_eq!(store.segment_count().await, 0);
    }

    #[tokio::test]
    async fn gap_never_completes() {
        let (engine, store) = engine();

        for index in [1, 2, 4] {
            engine
                .ingest(segment("5000123", 42, 7, index, 4, "x"))
                .await
                .unwrap();
        }

        let key = GroupKey {
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
        };
        for _ in 0..5 {
            assert_eq!(
                engine.try_merge(&key).await.unwrap(),
                MergeOutcome::NotYetComplete
            );
        }
        assert_eq!(store.merged_count().await, 0);

        // The missing part flips it.
        let result = engine
            .ingest(segment("5000123", 42, 7, 3, 4, "x"))
            .await
            .unwrap();
        assert!(matches!(result, IngestResult::StoredAndMerged(_)));
    }

    #[tokio::test]
    async fn duplicate_index_first_seen_wins() {
        let (engine, store) = engine();

        engine
            .ingest(segment("5000123", 42, 7, 1, 3, "one-"))
            .await
            .unwrap();
        engine
            .ingest(segment("5000123", 42, 7, 3, 3, "three"))
            .await
            .unwrap();
        engine
            .ingest(segment("5000123", 42, 7, 3, 3, "THREE"))
            .await
            .unwrap();
        let result = engine
            .ingest(segment("5000123", 42, 7, 2, 3, "two-"))
            .await
            .unwrap();

        let IngestResult::StoredAndMerged(message) = result else {
            panic!("expected merge, got {result:?}");
        };
        assert_eq!(message.body, "one-two-three");
        assert_eq!(store.merged_count().await, 1);
        // Both index-3 rows were stored; dedup happened at merge time.
        assert_eq!(store.segment_count().await, 4);
    }

    #[tokio::test]
    async fn late_duplicate_after_merge_is_a_noop() {
        let (engine, store) = engine();

        engine
            .ingest(segment("5000123", 42, 7, 1, 2, "Hello "))
            .await
            .unwrap();
        engine
            .ingest(segment("5000123", 42, 7, 2, 2, "World"))
            .await
            .unwrap();
        assert_eq!(store.merged_count().await, 1);

        let late = engine
            .ingest(segment("5000123", 42, 7, 2, 2, "World"))
            .await
            .unwrap();
        assert_eq!(late, IngestResult::AlreadyMerged);
        assert_eq!(store.merged_count().await, 1);

        let key = GroupKey {
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
        };
        assert_eq!(
            engine.try_merge(&key).await.unwrap(),
            MergeOutcome::AlreadyMerged
        );
    }

    #[tokio::test]
    async fn part_count_disagreement_trusts_highest_index() {
        let (engine, _store) = engine();

        // The index-1 segment claims 3 parts; the index-2 segment claims 2.
        // Index 2 is the highest seen, so the group completes at 2.
        engine
            .ingest(segment("5000123", 42, 7, 1, 3, "Hello "))
            .await
            .unwrap();
        let result = engine
            .ingest(segment("5000123", 42, 7, 2, 2, "World"))
            .await
            .unwrap();

        let IngestResult::StoredAndMerged(message) = result else {
            panic!("expected merge, got {result:?}");
        };
        assert_eq!(message.body, "Hello World");
    }

    #[tokio::test]
    async fn concurrent_merges_produce_exactly_one_record() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(ReassemblyEngine::new(
            store.clone() as Arc<dyn SegmentStore>
        ));

        // Stage a fully arrived group without triggering the merge.
        for index in 1..=5u32 {
            store
                .upsert_segment(&segment("5000123", 42, 7, index, 5, "x"))
                .await
                .unwrap();
        }
        let key = GroupKey {
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move { engine.try_merge(&key).await }));
        }

        let mut merged = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                MergeOutcome::Merged(_) => merged += 1,
                MergeOutcome::AlreadyMerged => already += 1,
                MergeOutcome::NotYetComplete => panic!("group was complete"),
            }
        }
        assert_eq!(merged, 1, "exactly one caller wins the merge");
        assert_eq!(already, 7);
        assert_eq!(store.merged_count().await, 1);
    }

    #[tokio::test]
    async fn purge_removes_old_incomplete_groups_only() {
        let (engine, store) = engine();

        // Old group missing part 3 of 3.
        store
            .upsert_segment(&segment_at("5000123", 42, 7, 1, 3, "a", 1_000))
            .await
            .unwrap();
        store
            .upsert_segment(&segment_at("5000123", 42, 7, 2, 3, "b", 1_001))
            .await
            .unwrap();

        // Fresh incomplete group from another sender.
        engine
            .ingest(segment("5000999", 1, 1, 1, 2, "fresh"))
            .await
            .unwrap();

        let purged = engine
            .purge_incomplete(Duration::from_secs(1800))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let old_key = GroupKey {
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
        };
        assert!(
            engine
                .store()
                .segments_for_group(&old_key)
                .await
                .unwrap()
                .is_empty()
        );
        // The fresh group survived.
        assert_eq!(store.segment_count().await, 1);
    }

    #[tokio::test]
    async fn purged_group_does_not_resurrect_on_late_arrival() {
        let (engine, store) = engine();

        store
            .upsert_segment(&segment_at("5000123", 42, 7, 1, 3, "a", 1_000))
            .await
            .unwrap();
        store
            .upsert_segment(&segment_at("5000123", 42, 7, 2, 3, "b", 1_001))
            .await
            .unwrap();
        engine
            .purge_incomplete(Duration::from_secs(1800))
            .await
            .unwrap();

        // The missing part finally arrives: a fresh group of one segment,
        // permanently incomplete.
        let result = engine
            .ingest(segment("5000123", 42, 7, 3, 3, "c"))
            .await
            .unwrap();
        assert_eq!(result, IngestResult::StoredIncomplete);
        assert_eq!(store.merged_count().await, 0);
        assert_eq!(store.segment_count().await, 1);
    }

    #[tokio::test]
    async fn purge_recovers_complete_but_unmerged_group() {
        let (engine, store) = engine();

        // All parts present but no merge was ever triggered.
        for index in 1..=2u32 {
            store
                .upsert_segment(&segment_at(
                    "5000123",
                    42,
                    7,
                    index,
                    2,
                    "p",
                    1_000 + index as i64,
                ))
                .await
                .unwrap();
        }

        let purged = engine
            .purge_incomplete(Duration::from_secs(1800))
            .await
            .unwrap();
        assert_eq!(purged, 0, "complete group must be merged, not purged");
        assert_eq!(store.merged_count().await, 1);
    }

    #[tokio::test]
    async fn reconcile_merges_all_ready_groups() {
        let (engine, store) = engine();

        // Two complete-but-unmerged groups, one genuinely incomplete.
        for reference in [1u8, 2] {
            for index in 1..=2u32 {
                store
                    .upsert_segment(&segment("5000123", 42, reference, index, 2, "p"))
                    .await
                    .unwrap();
            }
        }
        store
            .upsert_segment(&segment("5000123", 42, 3, 1, 2, "p"))
            .await
            .unwrap();

        let merged = engine.reconcile().await.unwrap();
        assert_eq!(merged, 2);
        assert_eq!(store.merged_count().await, 2);
        assert_eq!(store.pending_group_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ingest_failure_surfaces_and_retry_converges() {
        let memory = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyStore::new(memory.clone()));
        let engine = ReassemblyEngine::new(flaky.clone() as Arc<dyn SegmentStore>);

        engine
            .ingest(segment("5000123", 42, 7, 1, 2, "Hello "))
            .await
            .unwrap();

        let final_part = segment("5000123", 42, 7, 2, 2, "World");
        flaky.fail_next_upsert();
        let failed = engine.ingest(final_part.clone()).await;
        assert!(matches!(failed, Err(WeftError::Storage { .. })));
        assert_eq!(memory.merged_count().await, 0);

        // The source redelivers the same segment.
        let retried = engine.ingest(final_part).await.unwrap();
        let IngestResult::StoredAndMerged(message) = retried else {
            panic!("expected merge on retry, got {retried:?}");
        };
        assert_eq!(message.body, "Hello World");
        assert_eq!(memory.merged_count().await, 1);
    }

    #[tokio::test]
    async fn ingest_many_reports_per_segment_outcomes() {
        let (engine, _store) = engine();

        let batch = vec![
            segment("5000123", 42, 7, 1, 2, "Hello "),
            segment("5000123", 42, 7, 9, 2, "bogus"),
            segment("5000123", 42, 7, 2, 2, "World"),
        ];
        let results = engine.ingest_many(batch).await;

        assert!(matches!(results[0], Ok(IngestResult::StoredIncomplete)));
        assert!(matches!(
            results[1],
            Err(WeftError::InvalidSegment { .. })
        ));
        assert!(matches!(results[2], Ok(IngestResult::StoredAndMerged(_))));
    }

    #[tokio::test]
    async fn merged_id_stable_across_redundant_triggers() {
        let (engine, _store) = engine();

        engine
            .ingest(segment("5000123", 42, 7, 1, 2, "Hello "))
            .await
            .unwrap();
        let result = engine
            .ingest(segment("5000123", 42, 7, 2, 2, "World"))
            .await
            .unwrap();
        let IngestResult::StoredAndMerged(message) = result else {
            panic!("expected merge");
        };

        let key = GroupKey {
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
        };
        assert_eq!(message.id, key.merged_id());
        let stored = engine.store().get_merged(&key).await.unwrap().unwrap();
        assert_eq!(stored.id, message.id);
    }
}
