//! Dated collections of raster layers

use crate::raster::RasterLayer;
use chrono::NaiveDate;

/// Layers from one dataset, in acquisition order.
///
/// Layers without an acquisition date are kept by [`ImageCollection::new`]
/// but never match a date filter.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    layers: Vec<RasterLayer>,
}

impl ImageCollection {
    /// Build a collection, sorting dated layers by acquisition date
    pub fn new(mut layers: Vec<RasterLayer>) -> Self {
        // stable sort: undated layers keep their relative order at the front
        layers.sort_by_key(|l| l.acquired());
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RasterLayer> {
        self.layers.iter()
    }

    pub fn first(&self) -> Option<&RasterLayer> {
        self.layers.first()
    }

    /// Layers acquired in `[start, end)`
    pub fn filter_date(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .filter(|l| l.acquired().is_some_and(|d| d >= start && d < end))
                .cloned()
                .collect(),
        }
    }

    /// Layers acquired in calendar `year`
    pub fn filter_year(&self, year: i32) -> Self {
        match (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year + 1, 1, 1),
        ) {
            (Some(start), Some(end)) => self.filter_date(start, end),
            _ => Self::default(),
        }
    }

    /// Apply a fallible step to every layer
    pub fn try_map<E, F>(&self, f: F) -> std::result::Result<Self, E>
    where
        F: Fn(&RasterLayer) -> std::result::Result<RasterLayer, E>,
    {
        let layers = self.layers.iter().map(f).collect::<std::result::Result<_, E>>()?;
        Ok(Self { layers })
    }

    pub fn into_layers(self) -> Vec<RasterLayer> {
        self.layers
    }
}

impl FromIterator<RasterLayer> for ImageCollection {
    fn from_iter<I: IntoIterator<Item = RasterLayer>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;

    fn dated(y: i32, m: u32, d: u32) -> RasterLayer {
        RasterLayer::from_band("B4", Raster::filled(2, 2, 0.1))
            .with_acquired(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_sorted_by_date() {
        let c = ImageCollection::new(vec![dated(2022, 5, 1), dated(2021, 3, 1)]);
        assert_eq!(
            c.first().and_then(|l| l.acquired()),
            NaiveDate::from_ymd_opt(2021, 3, 1)
        );
    }

    #[test]
    fn test_filter_date_end_exclusive() {
        let c: ImageCollection = vec![dated(2021, 1, 1), dated(2021, 12, 31), dated(2022, 1, 1)]
            .into_iter()
            .collect();
        assert_eq!(c.filter_year(2021).len(), 2);
        assert_eq!(c.filter_year(2022).len(), 1);
        assert!(c.filter_year(2023).is_empty());
    }

    #[test]
    fn test_undated_layers_never_match() {
        let undated = RasterLayer::from_band("B4", Raster::filled(2, 2, 0.1));
        let c = ImageCollection::new(vec![undated, dated(2021, 6, 1)]);
        assert_eq!(c.len(), 2);
        assert_eq!(c.filter_year(2021).len(), 1);
    }
}
