//! Application services layer.

pub mod aggregate;
pub mod error;
pub mod jobs;
pub mod layout;
pub mod sources;
pub mod wall;
