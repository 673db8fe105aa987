// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path flattening and tessellation.
//!
//! Paths are recorded into an [`InstructionQueue`], replayed into a
//! [`PathCache`] by [`PathCache::flatten`], and then expanded into vertex
//! data with [`PathCache::expand_fill`] or [`PathCache::expand_stroke`].
//! The resulting [`RenderPath`]s are what a renderer consumes.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    clippy::missing_panics_doc,
    clippy::exhaustive_enums,
    reason = "Deferred"
)]

mod cache;
mod config;
mod expand;
mod instruction;
pub mod math;
mod vertex;

pub use cache::{Bounds, PathCache, PathPoint, PointFlags, RenderPath, Winding};
pub use config::{OpenContours, TessellationConfig};
pub use instruction::{Instruction, InstructionQueue};
pub use vertex::Vertex;

// Re-exported so callers can name caps, joins and shapes without a direct
// dependency on kurbo.
pub use peniko::kurbo;
