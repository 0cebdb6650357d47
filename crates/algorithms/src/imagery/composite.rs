//! Per-pixel compositing of image collections

use crate::util::build_output;
use agbmap_core::raster::{ImageCollection, Raster, RasterLayer};
use agbmap_core::{Error, Result};
use rayon::prelude::*;

/// Per-band median of the valid values across the collection.
///
/// Band names come from the first layer; every layer must carry them and
/// share its geometry. An empty collection yields `Ok(None)`.
pub fn median(collection: &ImageCollection) -> Result<Option<RasterLayer>> {
    composite(collection, |values| {
        if values.is_empty() {
            return f64::NAN;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    })
}

/// Stack the collection with later layers on top: each pixel takes the
/// value of the last layer where it is valid.
pub fn mosaic(collection: &ImageCollection) -> Result<Option<RasterLayer>> {
    composite(collection, |values| values.last().copied().unwrap_or(f64::NAN))
}

fn composite<F>(collection: &ImageCollection, reduce: F) -> Result<Option<RasterLayer>>
where
    F: Fn(&mut Vec<f64>) -> f64 + Sync + Send,
{
    let Some(first) = collection.first() else {
        return Ok(None);
    };
    let Some(template) = first.template() else {
        return Ok(None);
    };

    for layer in collection.iter() {
        match layer.template() {
            Some(t) if t.same_geometry(template) => {}
            _ => {
                return Err(Error::GridMismatch(
                    "collection layers must share one grid before compositing".into(),
                ))
            }
        }
    }

    let mut out = RasterLayer::new();
    for name in first.band_names() {
        let stack: Vec<&Raster<f64>> = collection
            .iter()
            .map(|layer| layer.require_band(&name))
            .collect::<Result<_>>()?;
        let raster = reduce_stack(template, &stack, &reduce)?;
        out = out.with_band(name, raster)?;
    }
    Ok(Some(out))
}

fn reduce_stack<F>(template: &Raster<f64>, stack: &[&Raster<f64>], reduce: &F) -> Result<Raster<f64>>
where
    F: Fn(&mut Vec<f64>) -> f64 + Sync + Send,
{
    let (rows, cols) = template.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values = Vec::with_capacity(stack.len());
            for (col, cell) in row_data.iter_mut().enumerate() {
                values.clear();
                values.extend(
                    stack
                        .iter()
                        .map(|r| unsafe { r.get_unchecked(row, col) })
                        .filter(|v| v.is_finite()),
                );
                *cell = reduce(&mut values);
            }
            row_data
        })
        .collect();
    build_output(template, rows, cols, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(values: &[f64]) -> RasterLayer {
        RasterLayer::from_band("B4", Raster::from_vec(values.to_vec(), 1, values.len()).unwrap())
    }

    #[test]
    fn test_median_ignores_invalid() {
        let c = ImageCollection::new(vec![
            layer(&[1.0, f64::NAN, 5.0, 4.0]),
            layer(&[3.0, f64::NAN, 1.0, 2.0]),
            layer(&[2.0, f64::NAN, f64::NAN, f64::NAN]),
        ]);
        let out = median(&c).unwrap().unwrap();
        let b4 = out.band("B4").unwrap();
        assert_eq!(b4.get(0, 0).unwrap(), 2.0);
        assert!(b4.get(0, 1).unwrap().is_nan());
        assert_eq!(b4.get(0, 2).unwrap(), 3.0);
        assert_eq!(b4.get(0, 3).unwrap(), 3.0);
    }

    #[test]
    fn test_mosaic_last_valid_on_top() {
        // undated layers keep insertion order
        let c = ImageCollection::new(vec![layer(&[1.0, 1.0]), layer(&[2.0, f64::NAN])]);
        let out = mosaic(&c).unwrap().unwrap();
        let b4 = out.band("B4").unwrap();
        assert_eq!(b4.get(0, 0).unwrap(), 2.0);
        assert_eq!(b4.get(0, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_collection() {
        assert!(median(&ImageCollection::default()).unwrap().is_none());
    }

    #[test]
    fn test_geometry_mismatch() {
        let c = ImageCollection::new(vec![layer(&[1.0, 2.0]), layer(&[1.0, 2.0, 3.0])]);
        assert!(matches!(mosaic(&c), Err(Error::GridMismatch(_))));
    }
}
