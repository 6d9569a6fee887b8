// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Weft multipart reassembly service.
//!
//! This crate provides the foundational types, the error type, and the
//! store trait seam used throughout the Weft workspace. Storage backends
//! implement [`SegmentStore`]; the engine consumes it.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::WeftError;
pub use traits::SegmentStore;
pub use types::{
    GroupKey, GroupState, HealthStatus, IngestResult, MergeOutcome, MergedMessage, Segment,
};
