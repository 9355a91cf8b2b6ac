use chrono::{Local, NaiveDate, TimeZone};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::db::ImageMetadata;
use crate::error::ExtractionError;

const TAG_RATING: exif::Tag = exif::Tag(exif::Context::Tiff, 0x4746);
const TAG_XP_TITLE: exif::Tag = exif::Tag(exif::Context::Tiff, 0x9c9b);
const TAG_XP_COMMENT: exif::Tag = exif::Tag(exif::Context::Tiff, 0x9c9c);
const TAG_XP_KEYWORDS: exif::Tag = exif::Tag(exif::Context::Tiff, 0x9c9e);

/// Reads the metadata the cache stores for one file.
pub trait MetadataExtractor: Send {
    fn extract(&self, path: &Path) -> Result<ImageMetadata, ExtractionError>;
}

/// Dimensions from the image header, everything else from EXIF.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, path: &Path) -> Result<ImageMetadata, ExtractionError> {
        let file = File::open(path).map_err(|source| ExtractionError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut metadata = ImageMetadata::default();

        let exif = exif::Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .ok();
        if let Some(ref exif) = exif {
            read_exif_fields(exif, &mut metadata);
        }

        match header_dimensions(path) {
            Ok((width, height)) => {
                metadata.width = width;
                metadata.height = height;
            }
            Err(message) => {
                // Formats the decoder does not know (HEIC, RAW) still carry
                // their pixel size in EXIF.
                let from_exif = exif.as_ref().and_then(|exif| {
                    Some((
                        uint_field(exif, exif::Tag::PixelXDimension)?,
                        uint_field(exif, exif::Tag::PixelYDimension)?,
                    ))
                });
                let (width, height) = from_exif.ok_or_else(|| ExtractionError::Undecodable {
                    path: path.to_path_buf(),
                    message,
                })?;
                metadata.width = width;
                metadata.height = height;
            }
        }

        Ok(metadata)
    }
}

fn header_dimensions(path: &Path) -> Result<(u32, u32), String> {
    image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())
}

fn read_exif_fields(exif: &exif::Exif, metadata: &mut ImageMetadata) {
    if let Some(orientation) = uint_field(exif, exif::Tag::Orientation) {
        if (1..=8).contains(&orientation) {
            metadata.orientation = orientation as u16;
        }
    }

    // Camera info
    metadata.make = ascii_field(exif, exif::Tag::Make);
    metadata.model = ascii_field(exif, exif::Tag::Model);
    metadata.lens = ascii_field(exif, exif::Tag::LensModel);
    metadata.rating = uint_field(exif, TAG_RATING).map(i64::from);

    // Exposure settings
    metadata.f_number = rational_field(exif, exif::Tag::FNumber);
    metadata.focal_length = rational_field(exif, exif::Tag::FocalLength);
    metadata.iso = uint_field(exif, exif::Tag::PhotographicSensitivity).map(i64::from);
    if let Some(field) = exif.get_field(exif::Tag::ExposureTime, exif::In::PRIMARY) {
        metadata.exposure_time = Some(field.display_value().to_string());
    }

    // Date taken
    metadata.exif_datetime = date_field(exif, exif::Tag::DateTimeOriginal)
        .or_else(|| date_field(exif, exif::Tag::DateTime));

    // Descriptive text
    metadata.caption = ascii_field(exif, exif::Tag::ImageDescription)
        .or_else(|| xp_field(exif, TAG_XP_COMMENT));
    metadata.title = xp_field(exif, TAG_XP_TITLE);
    metadata.tags = xp_field(exif, TAG_XP_KEYWORDS).map(|keywords| {
        keywords
            .split(';')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    });

    // GPS coordinates
    if let (Some(lat_field), Some(lat_ref), Some(lon_field), Some(lon_ref)) = (
        exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY),
    ) {
        if let (exif::Value::Rational(lat_vals), exif::Value::Rational(lon_vals)) =
            (&lat_field.value, &lon_field.value)
        {
            if lat_vals.len() >= 3 && lon_vals.len() >= 3 {
                let lat = dms_to_decimal(
                    ratio(&lat_vals[0]),
                    ratio(&lat_vals[1]),
                    ratio(&lat_vals[2]),
                );
                let lon = dms_to_decimal(
                    ratio(&lon_vals[0]),
                    ratio(&lon_vals[1]),
                    ratio(&lon_vals[2]),
                );

                let lat_ref_str = lat_ref.display_value().to_string();
                let lon_ref_str = lon_ref.display_value().to_string();

                metadata.latitude = Some(if lat_ref_str.contains('S') { -lat } else { lat });
                metadata.longitude = Some(if lon_ref_str.contains('W') { -lon } else { lon });
            }
        }
    }
}

fn uint_field(exif: &exif::Exif, tag: exif::Tag) -> Option<u32> {
    exif.get_field(tag, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

fn rational_field(exif: &exif::Exif, tag: exif::Tag) -> Option<f64> {
    match exif.get_field(tag, exif::In::PRIMARY).map(|f| &f.value) {
        Some(exif::Value::Rational(v)) => v.first().filter(|r| r.denom != 0).map(ratio),
        _ => None,
    }
}

fn ascii_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    match exif.get_field(tag, exif::In::PRIMARY).map(|f| &f.value) {
        Some(exif::Value::Ascii(values)) => values
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_matches(['\0', ' ']).to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Windows XP tags hold UTF-16LE text in a byte array.
fn xp_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    match exif.get_field(tag, exif::In::PRIMARY).map(|f| &f.value) {
        Some(exif::Value::Byte(bytes)) => decode_utf16le(bytes),
        _ => None,
    }
}

fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units)
        .trim_matches(['\0', ' '])
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// EXIF date strings carry no zone; they are read as local time.
fn date_field(exif: &exif::Exif, tag: exif::Tag) -> Option<f64> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    let bytes = match &field.value {
        exif::Value::Ascii(values) => values.first()?,
        _ => return None,
    };
    let dt = exif::DateTime::from_ascii(bytes).ok()?;
    let naive = NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(u32::from(dt.hour), u32::from(dt.minute), u32::from(dt.second))?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.timestamp() as f64)
}

fn ratio(r: &exif::Rational) -> f64 {
    if r.denom == 0 {
        0.0
    } else {
        r.num as f64 / r.denom as f64
    }
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
