//! NPC Composer: recursive weighted random composition for games.
//!
//! Builds complex entities at generation time by picking at most one
//! option from each weighted group of a composite template, recursing
//! into options that are templates themselves, and flattening the
//! result into an ordered list of leaf components for the host to spawn.

pub mod core;
pub mod schema;
