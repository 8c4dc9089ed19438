use crate::model::{Dimension, Timestamp};
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),
}

/// What extraction found. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub pixel_size: Option<Dimension>,
    pub exif_size: Option<Dimension>,
    pub capture_time: Option<Timestamp>,
}

pub trait MetadataExtractor {
    fn extract(&self, path: &Path) -> Result<Metadata, ExtractError>;
}

impl<T: MetadataExtractor + ?Sized> MetadataExtractor for &T {
    fn extract(&self, path: &Path) -> Result<Metadata, ExtractError> {
        (**self).extract(path)
    }
}

/// Reads pixel dimensions from the image header and size/capture time from
/// embedded EXIF tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl ExifExtractor {
    pub fn new() -> Self {
        Self
    }

    fn pixel_size(&self, path: &Path) -> Option<Dimension> {
        match image::image_dimensions(path) {
            Ok((width, height)) => Some(Dimension::new(width, height)),
            Err(e) => {
                log::debug!("Could not read dimensions for {}: {}", path.display(), e);
                None
            }
        }
    }

    fn exif_size(&self, exif: &exif::Exif) -> Option<Dimension> {
        let width = self
            .uint_field(exif, Tag::PixelXDimension)
            .or_else(|| self.uint_field(exif, Tag::ImageWidth))?;
        let height = self
            .uint_field(exif, Tag::PixelYDimension)
            .or_else(|| self.uint_field(exif, Tag::ImageLength))?;
        Some(Dimension::new(width, height))
    }

    fn capture_time(&self, exif: &exif::Exif) -> Option<Timestamp> {
        let field = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
            .into_iter()
            .find_map(|tag| exif.get_field(tag, In::PRIMARY))?;
        let text = self.field_to_string(&field.value)?;
        match text.parse() {
            Ok(ts) => Some(ts),
            Err(e) => {
                log::warn!("Failed to parse EXIF datetime: {}", e);
                None
            }
        }
    }

    fn uint_field(&self, exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
    }

    fn field_to_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Ascii(vec) => vec.first().map(|ascii| {
                String::from_utf8_lossy(ascii)
                    .trim_end_matches('\0')
                    .to_string()
            }),
            Value::Undefined(data, _) => Some(
                String::from_utf8_lossy(data)
                    .trim_end_matches('\0')
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, path: &Path) -> Result<Metadata, ExtractError> {
        let pixel_size = self.pixel_size(path);

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            // A readable image without EXIF still has a useful pixel size.
            Err(_) if pixel_size.is_some() => {
                return Ok(Metadata {
                    pixel_size,
                    ..Metadata::default()
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Metadata {
            pixel_size,
            exif_size: self.exif_size(&exif),
            capture_time: self.capture_time(&exif),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extract_no_file() {
        let extractor = ExifExtractor::new();
        let result = extractor.extract(Path::new("/non/existent/file.jpg"));
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }

    #[test]
    fn test_extract_not_an_image() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("no_exif.jpg");
        fs::write(&file_path, b"This is not an image file").unwrap();

        let result = ExifExtractor::new().extract(&file_path);
        assert!(matches!(result, Err(ExtractError::Parse(_))));
    }

    #[test]
    fn test_extract_image_without_exif() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("plain.png");
        image::RgbImage::new(4, 3).save(&file_path).unwrap();

        let metadata = ExifExtractor::new().extract(&file_path).unwrap();
        assert_eq!(metadata.pixel_size, Some(Dimension::new(4, 3)));
        assert_eq!(metadata.exif_size, None);
        assert_eq!(metadata.capture_time, None);
    }

    #[test]
    fn test_field_to_string_trims_nul() {
        let extractor = ExifExtractor::new();
        let value = Value::Ascii(vec![b"2023:12:25 14:30:45\0".to_vec()]);
        assert_eq!(
            extractor.field_to_string(&value),
            Some("2023:12:25 14:30:45".to_string())
        );
        assert_eq!(extractor.field_to_string(&Value::Short(vec![1])), None);
    }
}
