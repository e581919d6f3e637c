//! The voxel world core: a headless, deterministic simulation of a
//! block-structured world, addressable by integer coordinates.
//!
//! The pieces, roughly in dependency order: [`settings`] (flat key/value
//! configuration), [`map_block`] and [`serialize`] (the 16³ unit of
//! storage and its durable form), [`database`] (blob persistence),
//! [`map`] (the sparse store with edits, events and the unload sweeper),
//! [`vmanip`] (bulk scratch buffers), [`noise`] (deterministic noise and
//! PRNGs), [`biome`]/[`mapgen`]/[`cavegen`]/[`dungeongen`] (terrain
//! generation), [`light`] (two-bank propagation), [`liquid`] (the
//! cellular liquid transformer) and [`emerge`] (the load-or-generate
//! worker pool).

pub mod biome;
pub mod cavegen;
pub mod database;
pub mod dungeongen;
pub mod emerge;
mod fs_util;
pub mod light;
pub mod liquid;
pub mod map;
pub mod map_block;
pub mod mapgen;
pub mod noise;
pub mod serialize;
pub mod settings;
pub mod vmanip;
pub mod world;
