// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multipart reassembly engine for the Weft service.
//!
//! [`ReassemblyEngine`] ingests segments and merges completed groups
//! exactly once; [`SweepRunner`] re-evaluates stragglers on an interval
//! and purges groups that will never complete.

pub mod engine;
pub mod sweep;

#[cfg(test)]
mod proptests;

pub use engine::ReassemblyEngine;
pub use sweep::{SweepReport, SweepRunner};
