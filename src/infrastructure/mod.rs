//! In-memory adapters for every port, plus catalog seeding.

pub mod cache;
pub mod in_memory;
pub mod platform;
pub mod seed;
