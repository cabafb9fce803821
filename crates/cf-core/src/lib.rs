//! cf-core: Shared types, traits, and utilities for CueFlow
//!
//! This crate provides the foundational types used across all CueFlow crates.

mod curve;
mod handle;
mod time;

pub use curve::*;
pub use handle::*;
pub use time::*;
