// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory SegmentStore for deterministic testing.
//!
//! `MemoryStore` implements the full store contract against plain
//! collections, preserving insertion order so first-seen-wins semantics
//! match the SQLite backend. No I/O, no temp files.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use weft_core::types::{GroupKey, HealthStatus, MergedMessage, Segment};
use weft_core::{SegmentStore, WeftError};

#[derive(Default)]
struct Inner {
    /// Segments in insertion order; replace-in-place on id collision.
    segments: Vec<Segment>,
    /// Merged messages keyed by canonical group key.
    merged: HashMap<String, MergedMessage>,
}

/// An in-memory segment store for testing.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored segments, across all groups.
    pub async fn segment_count(&self) -> usize {
        self.inner.lock().await.segments.len()
    }

    /// Total number of merged messages.
    pub async fn merged_count(&self) -> usize {
        self.inner.lock().await.merged.len()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn initialize(&self) -> Result<(), WeftError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), WeftError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, WeftError> {
        Ok(HealthStatus::Healthy)
    }

    async fn upsert_segment(&self, segment: &Segment) -> Result<(), WeftError> {
        let mut inner = self.inner.lock().await;
        match inner.segments.iter_mut().find(|s| s.id == segment.id) {
            Some(existing) => *existing = segment.clone(),
            None => inner.segments.push(segment.clone()),
        }
        Ok(())
    }

    async fn segments_for_group(&self, key: &GroupKey) -> Result<Vec<Segment>, WeftError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .segments
            .iter()
            .filter(|s| s.group_key() == *key)
            .cloned()
            .collect())
    }

    async fn insert_merged(&self, message: &MergedMessage) -> Result<bool, WeftError> {
        let mut inner = self.inner.lock().await;
        if inner.merged.contains_key(&message.group_key) {
            return Ok(false);
        }
        inner
            .merged
            .insert(message.group_key.clone(), message.clone());
        Ok(true)
    }

    async fn merged_exists(&self, key: &GroupKey) -> Result<bool, WeftError> {
        Ok(self.inner.lock().await.merged.contains_key(&key.canonical()))
    }

    async fn get_merged(&self, key: &GroupKey) -> Result<Option<MergedMessage>, WeftError> {
        Ok(self.inner.lock().await.merged.get(&key.canonical()).cloned())
    }

    async fn stale_groups(&self, cutoff: i64) -> Result<Vec<GroupKey>, WeftError> {
        let inner = self.inner.lock().await;
        let mut oldest: HashMap<String, (GroupKey, i64)> = HashMap::new();
        for segment in &inner.segments {
            let key = segment.group_key();
            let canonical = key.canonical();
            if inner.merged.contains_key(&canonical) {
                continue;
            }
            let entry = oldest.entry(canonical).or_insert((key, segment.received_at));
            if segment.received_at < entry.1 {
                entry.1 = segment.received_at;
            }
        }
        let mut groups: Vec<(GroupKey, i64)> = oldest
            .into_values()
            .filter(|(_, received_at)| *received_at < cutoff)
            .collect();
        groups.sort_by_key(|(_, received_at)| *received_at);
        Ok(groups.into_iter().map(|(key, _)| key).collect())
    }

    async fn delete_group(&self, key: &GroupKey) -> Result<u64, WeftError> {
        let mut inner = self.inner.lock().await;
        let before = inner.segments.len();
        inner.segments.retain(|s| s.group_key() != *key);
        Ok((before - inner.segments.len()) as u64)
    }

    async fn merged_messages(
        &self,
        sender: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MergedMessage>, WeftError> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<MergedMessage> = inner
            .merged
            .values()
            .filter(|m| sender.is_none_or(|s| m.sender == s))
            .cloned()
            .collect();
        messages.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = limit {
            messages.truncate(limit.max(0) as usize);
        }
        Ok(messages)
    }

    async fn pending_group_count(&self) -> Result<u64, WeftError> {
        let inner = self.inner.lock().await;
        let pending: std::collections::HashSet<String> = inner
            .segments
            .iter()
            .map(|s| s.group_key().canonical())
            .filter(|k| !inner.merged.contains_key(k))
            .collect();
        Ok(pending.len() as u64)
    }

    async fn message_count(&self) -> Result<u64, WeftError> {
        Ok(self.inner.lock().await.merged.len() as u64)
    }
}
