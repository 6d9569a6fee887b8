// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Weft integration tests.
//!
//! Provides store doubles and segment builders for fast, deterministic,
//! CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MemoryStore`] - In-memory `SegmentStore` with insertion-order
//!   semantics matching the SQLite backend
//! - [`FlakyStore`] - Wrapper that fails one designated operation, for
//!   retry-path testing
//! - [`segments`] - Segment builder functions

pub mod flaky_store;
pub mod memory_store;
pub mod segments;

pub use flaky_store::FlakyStore;
pub use memory_store::MemoryStore;
