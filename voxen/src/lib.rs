//! Re-exports all libraries of the voxen world core under one roof.
//!
//! Depend on this meta-crate for convenience, or on the individual
//! `voxen-core` / `voxen-world` crates to keep your dependency graph
//! minimal.

pub use voxen_core as core;
pub use voxen_world as world;
