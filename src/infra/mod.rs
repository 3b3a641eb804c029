//! Infrastructure adapters and runtime bootstrap.

pub mod avatars;
pub mod error;
pub mod http;
pub mod raster;
pub mod telemetry;
