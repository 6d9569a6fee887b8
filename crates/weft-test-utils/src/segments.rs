// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Segment builders for tests.

use weft_core::types::Segment;

/// Build a segment with a fresh receipt id and the current timestamp.
pub fn segment(
    sender: &str,
    logical_id: i64,
    reference: u8,
    part_index: u32,
    part_count: u32,
    payload: &str,
) -> Segment {
    segment_at(
        sender,
        logical_id,
        reference,
        part_index,
        part_count,
        payload,
        chrono::Utc::now().timestamp_millis(),
    )
}

/// Build a segment with an explicit receipt timestamp.
pub fn segment_at(
    sender: &str,
    logical_id: i64,
    reference: u8,
    part_index: u32,
    part_count: u32,
    payload: &str,
    received_at: i64,
) -> Segment {
    Segment {
        id: format!("seg-{}", uuid::Uuid::new_v4()),
        sender: sender.to_string(),
        logical_id,
        reference,
        part_index,
        part_count,
        payload: payload.to_string(),
        received_at,
    }
}
