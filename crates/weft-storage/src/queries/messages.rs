// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Complete-message operations.

use rusqlite::params;

use weft_core::WeftError;
use weft_core::types::{GroupKey, MergedMessage};

use crate::database::Database;

/// Insert a merged message unless one already exists for its group.
///
/// Returns `false` when a row with the same group key was already present.
/// The UNIQUE constraint on `group_key` decides the race; the losing writer
/// observes zero affected rows instead of an error.
pub async fn insert_merged(db: &Database, message: &MergedMessage) -> Result<bool, WeftError> {
    let msg = message.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO messages (id, group_key, sender, body, is_multipart, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(group_key) DO NOTHING",
                params![
                    msg.id,
                    msg.group_key,
                    msg.sender,
                    msg.body,
                    msg.is_multipart,
                    msg.completed_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether a merged record exists for the group.
pub async fn merged_exists(db: &Database, key: &GroupKey) -> Result<bool, WeftError> {
    let group_key = key.canonical();
    db.connection()
        .call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE group_key = ?1)",
                params![group_key],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The merged record for a group, if any.
pub async fn get_merged(
    db: &Database,
    key: &GroupKey,
) -> Result<Option<MergedMessage>, WeftError> {
    let group_key = key.canonical();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_key, sender, body, is_multipart, completed_at
                 FROM messages WHERE group_key = ?1",
            )?;
            let mut rows = stmt.query_map(params![group_key], map_message_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Complete messages for the conversation view, newest first.
///
/// A `NULL` sender matches everything; a negative LIMIT means no limit,
/// which keeps both filters in a single prepared statement.
pub async fn merged_messages(
    db: &Database,
    sender: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<MergedMessage>, WeftError> {
    let sender = sender.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_key, sender, body, is_multipart, completed_at
                 FROM messages
                 WHERE (?1 IS NULL OR sender = ?1)
                 ORDER BY completed_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![sender, limit.unwrap_or(-1)], map_message_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Total number of complete messages stored.
pub async fn message_count(db: &Database) -> Result<u64, WeftError> {
    db.connection()
        .call(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> Result<MergedMessage, rusqlite::Error> {
    Ok(MergedMessage {
        id: row.get(0)?,
        group_key: row.get(1)?,
        sender: row.get(2)?,
        body: row.get(3)?,
        is_multipart: row.get(4)?,
        completed_at: row.get(5)?,
    })
}
