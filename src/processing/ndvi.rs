// src/processing/ndvi.rs
use rayon::prelude::*;

use crate::model::Composite;
use crate::raster::Raster;

/// Normalized Difference Vegetation Index: `(NIR - RED) / (NIR + RED)`,
/// elementwise over the composite.
///
/// A zero denominator with both bands present yields 0 rather than an
/// undefined value; NaN in either band (no data) propagates. Pure and
/// deterministic, repeat calls are bit-identical.
pub fn ndvi(composite: &Composite) -> Raster<f32> {
    let (width, height) = composite.bands.shape();
    let nir = composite.bands.nir.data();
    let red = composite.bands.red.data();

    let mut out = vec![0.0f32; width * height];
    out.par_iter_mut().enumerate().for_each(|(i, value)| {
        let n = nir[i];
        let r = red[i];
        *value = if n.is_nan() || r.is_nan() {
            f32::NAN
        } else if n + r == 0.0 {
            0.0
        } else {
            (n - r) / (n + r)
        };
    });

    Raster::from_vec(width, height, out)
}
