// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Segment CRUD and group scan operations.

use rusqlite::params;

use weft_core::WeftError;
use weft_core::types::{GroupKey, Segment};

use crate::database::Database;

/// Insert-or-replace a segment by its own id.
pub async fn upsert_segment(db: &Database, segment: &Segment) -> Result<(), WeftError> {
    let seg = segment.clone();
    let group_key = segment.group_key().canonical();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO segments
                 (id, group_key, sender, logical_id, reference_number,
                  part_index, part_count, payload, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    seg.id,
                    group_key,
                    seg.sender,
                    seg.logical_id,
                    seg.reference,
                    seg.part_index,
                    seg.part_count,
                    seg.payload,
                    seg.received_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All segments of a group in first-stored order.
///
/// Insertion order is what makes the engine's first-seen-wins duplicate
/// tie-break deterministic.
pub async fn segments_for_group(
    db: &Database,
    key: &GroupKey,
) -> Result<Vec<Segment>, WeftError> {
    let group_key = key.canonical();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, logical_id, reference_number,
                        part_index, part_count, payload, received_at
                 FROM segments WHERE group_key = ?1
                 ORDER BY rowid ASC",
            )?;
            let rows = stmt.query_map(params![group_key], |row| {
                Ok(Segment {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    logical_id: row.get(2)?,
                    reference: row.get(3)?,
                    part_index: row.get(4)?,
                    part_count: row.get(5)?,
                    payload: row.get(6)?,
                    received_at: row.get(7)?,
                })
            })?;
            let mut segments = Vec::new();
            for row in rows {
                segments.push(row?);
            }
            Ok(segments)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Keys of unmerged groups whose oldest segment was received before `cutoff`.
pub async fn stale_groups(db: &Database, cutoff: i64) -> Result<Vec<GroupKey>, WeftError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.sender, s.logical_id, s.reference_number
                 FROM segments s
                 LEFT JOIN messages m ON m.group_key = s.group_key
                 WHERE m.id IS NULL
                 GROUP BY s.group_key, s.sender, s.logical_id, s.reference_number
                 HAVING MIN(s.received_at) < ?1
                 ORDER BY MIN(s.received_at) ASC",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(GroupKey {
                    sender: row.get(0)?,
                    logical_id: row.get(1)?,
                    reference: row.get(2)?,
                })
            })?;
            let mut keys = Vec::new();
            for row in rows {
                keys.push(row?);
            }
            Ok(keys)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete every segment of a group. Returns the number of rows removed.
pub async fn delete_group(db: &Database, key: &GroupKey) -> Result<u64, WeftError> {
    let group_key = key.canonical();
    db.connection()
        .call(move |conn| {
            let deleted =
                conn.execute("DELETE FROM segments WHERE group_key = ?1", params![group_key])?;
            Ok(deleted as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of groups that have segments but no merged record yet.
pub async fn pending_group_count(db: &Database) -> Result<u64, WeftError> {
    db.connection()
        .call(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT s.group_key)
                 FROM segments s
                 LEFT JOIN messages m ON m.group_key = s.group_key
                 WHERE m.id IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
