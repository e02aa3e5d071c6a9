//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the
//! ModelPixelScale/ModelTiepoint tags, the CRS by an EPSG entry in the
//! GeoKeyDirectory and the no-data value by the GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray64Float};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::debug;

// The decoder maps these ids to named variants, so `Tag::Unknown(33550)` never matches on read
const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// On-disk sample type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// 32-bit IEEE float; exact for integers up to 2^24
    #[default]
    Float32,
    /// 64-bit IEEE float; exact for integers up to 2^53
    Float64,
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    pub sample_format: SampleFormat,
}

impl GeoTiffOptions {
    /// Options suitable for integer class codes wider than 24 bits
    pub fn float64() -> Self {
        Self {
            sample_format: SampleFormat::Float64,
        }
    }
}

/// Read a single-band GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::F32(buf) => cast_samples(&buf),
        DecodingResult::F64(buf) => cast_samples(&buf),
        DecodingResult::U8(buf) => cast_samples(&buf),
        DecodingResult::U16(buf) => cast_samples(&buf),
        DecodingResult::U32(buf) => cast_samples(&buf),
        DecodingResult::U64(buf) => cast_samples(&buf),
        DecodingResult::I8(buf) => cast_samples(&buf),
        DecodingResult::I16(buf) => cast_samples(&buf),
        DecodingResult::I32(buf) => cast_samples(&buf),
        DecodingResult::I64(buf) => cast_samples(&buf),
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    // Multi-band images decode interleaved; only single-band layers are valid factors
    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

fn cast_samples<S, T>(buf: &[S]) -> Vec<T>
where
    S: num_traits::ToPrimitive + Copy + num_traits::NumCast,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

/// GeoTransform from ModelPixelScaleTag + ModelTiepointTag
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code from the GeoKeyDirectory (projected key wins over geographic)
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY).ok()?;
    let mut geographic = None;
    let mut projected = None;

    // Header is 4 shorts, each entry is [id, location, count, value]
    for entry in keys.get(4..)?.chunks_exact(4) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        // location 0 means the value is stored inline
        if location != 0 || value == 0 || value == 32767 {
            continue;
        }
        match id {
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value),
            PROJECTED_CS_TYPE_KEY => projected = Some(value),
            _ => {}
        }
    }

    projected.or(geographic).map(|code| CRS::from_epsg(code as u32))
}

fn read_nodata<T: RasterElement, R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<T> {
    let text = decoder.get_tag_ascii_string(GDAL_NODATA).ok()?;
    let value: f64 = text.trim().trim_end_matches('\0').parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer, options)?;
    writer.flush()?;
    debug!(
        "Wrote {} x {} {:?} GeoTIFF {}",
        raster.cols(),
        raster.rows(),
        options.sample_format,
        path.as_ref().display()
    );
    Ok(())
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = raster.shape();

    match options.sample_format {
        SampleFormat::Float32 => {
            let data: Vec<f32> = raster
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
                .collect();
            let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
            write_geo_tags(image.encoder(), raster)?;
            image.write_data(&data)?;
        }
        SampleFormat::Float64 => {
            let data: Vec<f64> = raster
                .data()
                .iter()
                .map(|&v| v.to_f64().unwrap_or(f64::NAN))
                .collect();
            let mut image = encoder.new_image::<Gray64Float>(cols as u32, rows as u32)?;
            write_geo_tags(image.encoder(), raster)?;
            image.write_data(&data)?;
        }
    }

    Ok(())
}

fn write_geo_tags<T, W, K>(dir: &mut DirectoryEncoder<'_, W, K>, raster: &Raster<T>) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
    K: TiffKind,
{
    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    dir.write_tag(MODEL_PIXEL_SCALE, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    dir.write_tag(MODEL_TIEPOINT, &tiepoint[..])?;

    dir.write_tag(GEO_KEY_DIRECTORY, geo_keys(raster.crs()).as_slice())?;

    if let Some(nodata) = raster.nodata() {
        let text = nodata.to_string();
        dir.write_tag(GDAL_NODATA, text.as_str())?;
    }

    Ok(())
}

/// GeoKeyDirectory entries, sorted by key id as the format requires
fn geo_keys(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs
        .and_then(|c| c.epsg().map(|code| (code, c.is_geographic())))
        .and_then(|(code, geographic)| u16::try_from(code).ok().map(|c| (c, geographic)));

    // ModelTypeProjected = 1, ModelTypeGeographic = 2; RasterPixelIsArea = 1
    let model_type = match epsg {
        Some((_, true)) => 2,
        _ => 1,
    };
    let mut keys = vec![
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1,
    ];
    if let Some((code, geographic)) = epsg {
        let id = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
        keys.extend_from_slice(&[id, 0, 1, code]);
    }

    let count = (keys.len() / 4) as u16;
    let mut directory = vec![1, 1, 0, count];
    directory.extend(keys);
    directory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster<f64> {
        let mut r: Raster<f64> = Raster::from_vec((0..12).map(|v| v as f64).collect(), 3, 4).unwrap();
        r.set_transform(GeoTransform::new(500_000.0, 6_000_000.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(3402)));
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn test_geotiff_roundtrip_preserves_georeference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tif");
        let raster = sample_raster();

        write_geotiff(&raster, &path, &GeoTiffOptions::default()).unwrap();
        let back: Raster<f64> = read_geotiff(&path).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.get(2, 3).unwrap(), 11.0);
        assert_eq!(back.transform(), raster.transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(3402));
        assert_eq!(back.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_float64_keeps_wide_integer_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hru.tif");

        let mut codes: Raster<i64> = Raster::filled(2, 2, 99_999_999_999);
        codes.set(0, 1, 100_203_045).unwrap();
        codes.set(1, 0, i64::MIN).unwrap();
        codes.set_nodata(Some(i64::MIN));

        write_geotiff(&codes, &path, &GeoTiffOptions::float64()).unwrap();
        let back: Raster<i64> = read_geotiff(&path).unwrap();

        assert_eq!(back.get(0, 0).unwrap(), 99_999_999_999);
        assert_eq!(back.get(0, 1).unwrap(), 100_203_045);
        assert_eq!(back.nodata(), Some(i64::MIN));
        assert!(back.is_nodata(back.get(1, 0).unwrap()));
    }

    #[test]
    fn test_geo_tags_use_standard_ids() {
        assert_eq!(MODEL_PIXEL_SCALE.to_u16(), 33550);
        assert_eq!(MODEL_TIEPOINT.to_u16(), 33922);
        assert_eq!(GEO_KEY_DIRECTORY.to_u16(), 34735);
        assert_eq!(GDAL_NODATA.to_u16(), 42113);
        assert_eq!(Tag::from_u16_exhaustive(33550), MODEL_PIXEL_SCALE);
        assert_eq!(Tag::from_u16_exhaustive(42113), GDAL_NODATA);
    }

    #[test]
    fn test_georeference_read_from_offset_origin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let mut raster: Raster<f64> = Raster::filled(2, 2, 7.0);
        raster.set_transform(GeoTransform::new(301_000.0, 6_250_025.0, 25.0, -25.0));
        raster.set_nodata(Some(-1.0));

        write_geotiff(&raster, &path, &GeoTiffOptions::default()).unwrap();
        let back: Raster<f64> = read_geotiff(&path).unwrap();

        assert_eq!(back.cell_size(), 25.0);
        assert_eq!(back.transform().origin_x, 301_000.0);
        assert_eq!(back.transform().origin_y, 6_250_025.0);
        assert_eq!(back.nodata(), Some(-1.0));
        assert!(back.crs().is_none());
    }

    #[test]
    fn test_geographic_crs_uses_geographic_key() {
        let keys = geo_keys(Some(&CRS::wgs84()));
        assert_eq!(keys[3], 3);
        assert_eq!(&keys[4..8], &[GT_MODEL_TYPE_KEY, 0, 1, 2]);
        assert_eq!(&keys[12..16], &[GEOGRAPHIC_TYPE_KEY, 0, 1, 4326]);

        let bare = geo_keys(None);
        assert_eq!(bare[3], 2);
    }
}
