// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store trait for segment and message persistence backends.

use async_trait::async_trait;

use crate::error::WeftError;
use crate::types::{GroupKey, HealthStatus, MergedMessage, Segment};

/// The persistence seam between the reassembly engine and its backing store.
///
/// The store is the single source of truth: the engine holds no
/// authoritative state across calls, so every completeness evaluation
/// re-reads through this trait. Implementations manage the lifecycle of
/// their own connections and must be safe for concurrent callers.
#[async_trait]
pub trait SegmentStore: Send + Sync + 'static {
    /// Initializes the backend (migrations, connection setup, etc.).
    async fn initialize(&self) -> Result<(), WeftError>;

    /// Closes the backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), WeftError>;

    /// Performs a health check and returns the store's current status.
    async fn health_check(&self) -> Result<HealthStatus, WeftError>;

    /// Insert-or-replace a segment by its own id.
    ///
    /// Each physical receipt is individually durable; redelivered segments
    /// carry fresh ids and land as separate rows.
    async fn upsert_segment(&self, segment: &Segment) -> Result<(), WeftError>;

    /// All stored segments for a group, in first-stored order.
    async fn segments_for_group(&self, key: &GroupKey) -> Result<Vec<Segment>, WeftError>;

    /// Insert a merged message unless one already exists for its group.
    ///
    /// Returns `false` when a record with the same group key was already
    /// present. This is the store-level guarantee behind at-most-one merge
    /// per group: a racing writer loses cleanly instead of duplicating.
    async fn insert_merged(&self, message: &MergedMessage) -> Result<bool, WeftError>;

    /// Whether a merged record exists for the group.
    async fn merged_exists(&self, key: &GroupKey) -> Result<bool, WeftError>;

    /// The merged record for the group, if any.
    async fn get_merged(&self, key: &GroupKey) -> Result<Option<MergedMessage>, WeftError>;

    /// Keys of groups with no merged record whose oldest segment was
    /// received before `cutoff` (Unix epoch milliseconds).
    async fn stale_groups(&self, cutoff: i64) -> Result<Vec<GroupKey>, WeftError>;

    /// Delete every segment of a group. Returns the number of rows removed.
    async fn delete_group(&self, key: &GroupKey) -> Result<u64, WeftError>;

    /// Complete messages for the conversation view, newest first.
    ///
    /// Only merged/complete records are returned; raw segments are never
    /// visible through this read path.
    async fn merged_messages(
        &self,
        sender: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MergedMessage>, WeftError>;

    /// Number of groups that have segments but no merged record yet.
    async fn pending_group_count(&self) -> Result<u64, WeftError>;

    /// Total number of complete messages stored.
    async fn message_count(&self) -> Result<u64, WeftError>;
}
