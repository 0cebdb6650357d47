//! GeoTIFF reading and writing

mod geotiff;

pub use geotiff::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    GeoTiffOptions,
};
