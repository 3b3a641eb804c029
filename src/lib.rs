//! Mecenate aggregates sponsor records from multiple funding platforms,
//! merges and ranks them under operator policy, lays them out into an SVG
//! sponsor wall, and serves the artifacts through a periodically-refreshed
//! cache.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
