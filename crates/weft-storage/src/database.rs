// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;

use weft_core::WeftError;

/// Handle to the single SQLite connection.
///
/// Query modules accept `&Database` and run their closures through
/// [`Connection::call`], which serializes all access on one background
/// thread and so eliminates SQLITE_BUSY under concurrent callers.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` with WAL mode enabled and
    /// run all pending migrations.
    pub async fn open(path: &str) -> Result<Self, WeftError> {
        Self::open_with_options(path, true).await
    }

    /// Open with an explicit WAL mode choice.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, WeftError> {
        let conn = Connection::open(path.to_string())
            .await
            .map_err(|e| map_tr_err(e.into()))?;

        conn.call(move |conn| -> Result<(), WeftError> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")
                    .map_err(WeftError::storage)?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(WeftError::storage)?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(WeftError::storage)?;
            conn.pragma_update(None, "busy_timeout", 5000)
                .map_err(WeftError::storage)?;
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(WeftError::storage)?;

        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL so all committed data lands in the main file.
    pub async fn close(&self) -> Result<(), WeftError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Map a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> WeftError {
    WeftError::Storage {
        source: Box::new(e),
    }
}
