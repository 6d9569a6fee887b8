// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Weft workspace.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::Display;

/// One physically received SMS part.
///
/// Segments arrive independently and out of order; `id` is unique per
/// physical receipt (the source assigns it), so redelivered segments get
/// their own row and deduplication happens at merge time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Per-receipt unique identifier, assigned by the segment source.
    pub id: String,

    /// Originating phone number or short code.
    pub sender: String,

    /// Coarse session id grouping the parts of one multi-part message.
    pub logical_id: i64,

    /// Carrier-assigned reference distinguishing concurrent multi-part
    /// sends from the same sender (0-255).
    pub reference: u8,

    /// 1-based position within the group.
    pub part_index: u32,

    /// Total parts expected for the group.
    pub part_count: u32,

    /// Text content of this part.
    pub payload: String,

    /// Receipt timestamp, Unix epoch milliseconds.
    pub received_at: i64,
}

impl Segment {
    /// The key of the reassembly group this segment belongs to.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            sender: self.sender.clone(),
            logical_id: self.logical_id,
            reference: self.reference,
        }
    }

    /// Single-part messages bypass grouping entirely.
    pub fn is_single_part(&self) -> bool {
        self.part_count <= 1
    }
}

/// Composite key identifying one reassembly group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub sender: String,
    pub logical_id: i64,
    pub reference: u8,
}

impl GroupKey {
    /// Canonical string form used as the storage column value.
    pub fn canonical(&self) -> String {
        format!("{}/{}/{}", self.sender, self.logical_id, self.reference)
    }

    /// Deterministic identifier for the merged message of this group.
    ///
    /// Derived from a SHA-256 digest of the canonical form, so idempotent
    /// re-merge attempts produce the same id and collide on the store's
    /// primary key rather than creating a second record.
    pub fn merged_id(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        format!("msg-{}", &hex::encode(digest)[..32])
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// One logical chat message, produced by a merge or a single-part ingest.
///
/// Owned by the store once written; the engine never mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedMessage {
    /// Synthetic identifier, distinct from any segment id.
    pub id: String,

    pub sender: String,

    /// Segment payloads joined in `part_index` order.
    pub body: String,

    /// Completion timestamp, Unix epoch milliseconds.
    pub completed_at: i64,

    /// Canonical form of the source group key.
    pub group_key: String,

    /// `false` for single-part messages that bypassed grouping.
    pub is_multipart: bool,
}

/// Derived lifecycle state of a reassembly group. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GroupState {
    /// Some expected index in `[1, part_count]` is still missing.
    Incomplete,
    /// Every expected index is covered but no merged record exists yet.
    Complete,
    /// A merged record has been written; the group is never reprocessed.
    Merged,
}

/// Outcome of ingesting one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    /// Single-part message, stored directly as a complete record.
    StoredAsComplete(MergedMessage),
    /// Segment stored; its group is still missing parts.
    StoredIncomplete,
    /// Segment stored and it completed the group, triggering the merge.
    StoredAndMerged(MergedMessage),
    /// Late or duplicate segment for a group that already merged. No-op.
    AlreadyMerged,
}

/// Outcome of a completeness evaluation for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Some expected index is still missing.
    NotYetComplete,
    /// A merged record already exists for this group.
    AlreadyMerged,
    /// The group just merged into this message.
    Merged(MergedMessage),
}

/// Health status reported by store health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Store is fully operational.
    Healthy,
    /// Store is operational but experiencing issues.
    Degraded(String),
    /// Store is not operational.
    Unhealthy(String),
}
