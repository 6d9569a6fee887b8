// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault-injecting store wrapper for retry-path testing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use weft_core::types::{GroupKey, HealthStatus, MergedMessage, Segment};
use weft_core::{SegmentStore, WeftError};

use crate::memory_store::MemoryStore;

/// A store that fails exactly one designated operation, then behaves
/// normally.
///
/// Used to verify that ingestion failures surface to the caller and that
/// re-delivering the same segment afterwards converges on the same merge
/// outcome.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_next_upsert: AtomicBool,
    fail_next_insert_merged: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_next_upsert: AtomicBool::new(false),
            fail_next_insert_merged: AtomicBool::new(false),
        }
    }

    /// Make the next `upsert_segment` call fail.
    pub fn fail_next_upsert(&self) {
        self.fail_next_upsert.store(true, Ordering::SeqCst);
    }

    /// Make the next `insert_merged` call fail.
    pub fn fail_next_insert_merged(&self) {
        self.fail_next_insert_merged.store(true, Ordering::SeqCst);
    }

    fn injected() -> WeftError {
        WeftError::Storage {
            source: "injected storage failure".into(),
        }
    }
}

#[async_trait]
impl SegmentStore for FlakyStore {
    async fn initialize(&self) -> Result<(), WeftError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), WeftError> {
        self.inner.close().await
    }

    async fn health_check(&self) -> Result<HealthStatus, WeftError> {
        self.inner.health_check().await
    }

    async fn upsert_segment(&self, segment: &Segment) -> Result<(), WeftError> {
        if self.fail_next_upsert.swap(false, Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.upsert_segment(segment).await
    }

    async fn segments_for_group(&self, key: &GroupKey) -> Result<Vec<Segment>, WeftError> {
        self.inner.segments_for_group(key).await
    }

    async fn insert_merged(&self, message: &MergedMessage) -> Result<bool, WeftError> {
        if self.fail_next_insert_merged.swap(false, Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.insert_merged(message).await
    }

    async fn merged_exists(&self, key: &GroupKey) -> Result<bool, WeftError> {
        self.inner.merged_exists(key).await
    }

    async fn get_merged(&self, key: &GroupKey) -> Result<Option<MergedMessage>, WeftError> {
        self.inner.get_merged(key).await
    }

    async fn stale_groups(&self, cutoff: i64) -> Result<Vec<GroupKey>, WeftError> {
        self.inner.stale_groups(cutoff).await
    }

    async fn delete_group(&self, key: &GroupKey) -> Result<u64, WeftError> {
        self.inner.delete_group(key).await
    }

    async fn merged_messages(
        &self,
        sender: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MergedMessage>, WeftError> {
        self.inner.merged_messages(sender, limit).await
    }

    async fn pending_group_count(&self) -> Result<u64, WeftError> {
        self.inner.pending_group_count().await
    }

    async fn message_count(&self) -> Result<u64, WeftError> {
        self.inner.message_count().await
    }
}
