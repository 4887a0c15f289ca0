//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate. Georeferencing is carried by the
//! ModelPixelScale / ModelTiepoint tags, no-data by the GDAL_NODATA
//! ASCII tag and the CRS by a minimal GeoKey directory holding an EPSG code.
//! For richer format support enable the `gdal` feature.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (ignored by the native writer, honoured by GDAL)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file), band)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band)
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn decode_geotiff<T, R>(reader: R, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    if band.unwrap_or(1) != 1 {
        return Err(Error::UnsupportedDataType(
            "native reader supports single-band rasters only".to_string(),
        ));
    }

    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    if let Ok(text) = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_NODATA)) {
        let text = text.trim_matches(char::from(0)).trim();
        if let Ok(nd) = text.parse::<f64>() {
            raster.set_nodata(num_traits::cast(nd));
        }
    }

    if let Ok(keys) = decoder.get_tag_u16_vec(Tag::Unknown(GEO_KEY_DIRECTORY)) {
        raster.set_crs(crs_from_geokeys(&keys));
    }

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT))
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

fn crs_from_geokeys(keys: &[u16]) -> Option<CRS> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|k| {
            (k[0] == PROJECTED_CS_TYPE_KEY || k[0] == GEOGRAPHIC_TYPE_KEY) && k[1] == 0 && k[3] != 32767
        })
        .map(|k| CRS::from_epsg(k[3] as u32))
}

fn geokeys_for(crs: Option<&CRS>) -> Vec<u16> {
    // Model type 1 = projected, 2 = geographic; raster type 1 = PixelIsArea
    let epsg = crs.and_then(CRS::epsg).filter(|&c| c <= u16::MAX as u32);
    match epsg {
        Some(code) => {
            let geographic = code == 4326;
            let (model, key) = if geographic {
                (2, GEOGRAPHIC_TYPE_KEY)
            } else {
                (1, PROJECTED_CS_TYPE_KEY)
            };
            vec![
                1, 1, 0, 3,
                GT_MODEL_TYPE_KEY, 0, 1, model,
                GT_RASTER_TYPE_KEY, 0, 1, 1,
                key, 0, 1, code as u16,
            ]
        }
        None => vec![
            1, 1, 0, 2,
            GT_MODEL_TYPE_KEY, 0, 1, 1,
            GT_RASTER_TYPE_KEY, 0, 1, 1,
        ],
    }
}

/// Write a Raster to a GeoTIFF file as 64-bit float
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    _options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(
    raster: &Raster<T>,
    _options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f64> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f64::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let geokeys = geokeys_for(raster.crs());
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if let Some(nd) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster<f64> {
        let mut r = Raster::filled(4, 6, 12.5);
        r.set_transform(GeoTransform::new(1000.0, 2000.0, 5.0, -5.0));
        r.set_crs(Some(CRS::from_epsg(32633)));
        r.set_nodata(Some(f64::NAN));
        r.set(1, 2, f64::NAN).unwrap();
        r.set(3, 5, 1.0 / 3.0).unwrap();
        r
    }

    #[test]
    fn test_buffer_roundtrip_keeps_metadata() {
        let raster = sample();
        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes, None).unwrap();

        assert_eq!(back.shape(), (4, 6));
        assert_eq!(back.transform(), raster.transform());
        assert_eq!(back.crs().and_then(CRS::epsg), Some(32633));
        assert!(back.nodata().unwrap().is_nan());
        assert!(back.get(1, 2).unwrap().is_nan());
        assert_eq!(back.get(3, 5).unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn test_file_roundtrip() {
        let raster = sample();
        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path(), None).unwrap();

        let back: Raster<f64> = read_geotiff(tmp.path(), None).unwrap();
        assert_eq!(back.get(0, 0).unwrap(), 12.5);
    }

    #[test]
    fn test_writes_64_bit_float_samples() {
        let bytes = write_geotiff_to_buffer(&sample(), None).unwrap();
        let mut decoder = Decoder::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::Gray(64));
        // SampleFormat 3 = IEEE floating point
        assert_eq!(decoder.get_tag_u32(Tag::SampleFormat).unwrap(), 3);
    }

    #[test]
    fn test_second_band_is_rejected() {
        let bytes = write_geotiff_to_buffer(&sample(), None).unwrap();
        let res: Result<Raster<f64>> = read_geotiff_from_buffer(&bytes, Some(2));
        assert!(res.is_err());
    }
}
