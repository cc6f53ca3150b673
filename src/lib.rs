// src/lib.rs
pub mod acquire;
pub mod batch;
pub mod cli;
pub mod error;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod processing;
pub mod raster;
pub mod risk;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
