//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the ModelPixelScale,
//! ModelTiepoint and GeoKeyDirectory tags; the CRS round-trips as an EPSG code.
//! A GDAL_NODATA tag becomes the raster's nodata value.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// CRS to record when the raster carries none
    pub fallback_crs: Option<CRS>,
}

/// Read the first band of a GeoTIFF file into a raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer<T: RasterElement>(data: &[u8]) -> Result<Raster<T>> {
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let mut data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // Interleaved multi-sample images: keep the first sample
    if data.len() > rows * cols && rows * cols > 0 && data.len() % (rows * cols) == 0 {
        let samples = data.len() / (rows * cols);
        data = data.into_iter().step_by(samples).collect();
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_epsg(&mut decoder).map(CRS::from_epsg));
    raster.set_nodata(read_nodata(&mut decoder).and_then(num_traits::cast));

    Ok(raster)
}

/// GDAL_NODATA is an ASCII number, possibly NUL-terminated
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    text.trim_end_matches('\0').trim().parse::<f64>().ok()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .ok()?;
    // header is 4 shorts, then 4 shorts per key: id, location, count, value
    keys.get(4..)?
        .chunks_exact(4)
        .find(|k| (k[0] == PROJECTED_CS_TYPE_KEY || k[0] == GEOGRAPHIC_TYPE_KEY) && k[1] == 0)
        .map(|k| u32::from(k[3]))
}

/// Write a raster to a single-band 32-bit float GeoTIFF
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T: RasterElement>(
    raster: &Raster<T>,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn geo_keys(crs: Option<&CRS>) -> Vec<u16> {
    // GTModelType: 1 projected, 2 geographic. GTRasterType 1 = PixelIsArea.
    let epsg = crs
        .and_then(|c| c.epsg())
        .and_then(|code| u16::try_from(code).ok());
    let geographic = crs.is_some_and(|c| c.is_geographic());

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE_KEY, 0, 1, if geographic { 2 } else { 1 }],
        [GT_RASTER_TYPE_KEY, 0, 1, 1],
    ];
    if let Some(code) = epsg {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        entries.push([key, 0, 1, code]);
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let keys = geo_keys(raster.crs().or(options.fallback_crs.as_ref()));
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster<f64> {
        let mut r = Raster::from_vec((0..12).map(|v| v as f64).collect(), 3, 4).unwrap();
        r.set(1, 2, f64::NAN).unwrap();
        r.set_transform(GeoTransform::north_up(500_000.0, 9_800_000.0, 100.0));
        r.set_crs(Some(CRS::from_epsg(32749)));
        r
    }

    #[test]
    fn test_buffer_roundtrip_keeps_georeferencing() {
        let buf = write_geotiff_to_buffer(&sample(), None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.transform(), sample().transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32749));
        assert!(back.get(1, 2).unwrap().is_nan());
        assert_eq!(back.get(2, 3).unwrap(), 11.0);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agb.tif");
        write_geotiff(&sample(), &path, None).unwrap();
        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.get(0, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_gdal_nodata_tag() {
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(2, 1).unwrap();
            image.encoder().write_tag(Tag::GdalNodata, "-9999").unwrap();
            image.write_data(&[-9999.0_f32, 120.0]).unwrap();
        }
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.nodata(), Some(-9999.0));
        assert!(back.is_nodata(back.get(0, 0).unwrap()));
        assert_eq!(back.statistics().valid_count, 1);
        assert_eq!(back.statistics().max, Some(120.0));
    }

    #[test]
    fn test_no_nodata_tag() {
        let buf = write_geotiff_to_buffer(&sample(), None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.nodata(), None);
    }

    #[test]
    fn test_geographic_key() {
        let keys = geo_keys(Some(&CRS::wgs84()));
        assert_eq!(keys[3], 3);
        assert!(keys.chunks_exact(4).any(|k| k == [GEOGRAPHIC_TYPE_KEY, 0, 1, 4326]));
    }
}
