//! Shared raster helpers

use agbmap_core::raster::Raster;
use agbmap_core::{Error, Result};
use ndarray::Array2;

pub(crate) fn is_nodata_f64(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) => (value - nd).abs() < f64::EPSILON,
        None => false,
    }
}

pub(crate) fn check_dimensions(a: &Raster<f64>, b: &Raster<f64>) -> Result<()> {
    if a.shape() != b.shape() {
        let (er, ec) = a.shape();
        let (ar, ac) = b.shape();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}

/// NaN-nodata f64 raster with `template`'s georeferencing
pub(crate) fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
