// src/processing/mod.rs
pub mod change;
pub mod ndvi;
pub mod polygons;
pub mod stats;

pub use change::{detect_loss, ChangeMaps};
pub use ndvi::ndvi;
pub use polygons::extract_polygons;
pub use stats::aggregate;
