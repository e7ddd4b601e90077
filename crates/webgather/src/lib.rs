//! Public facade crate for `webgather`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `webgather-core`.

pub use webgather_core::*;
