//! Pure Rust probe built on the `image` crate.
//!
//! Only headers are read: TIFF masters through [`read_tiff_tags`], other
//! formats through the `image` decoder's header (`dimensions`,
//! `color_type`). No pixel data is decoded.

use super::probe::{ImageProbe, ProbeError};
use super::tiff_tags::{read_jfif_density, read_tiff_tags};
use crate::types::TechnicalAttributes;
use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Production probe. See the [module docs](self).
#[derive(Debug, Default, Clone, Copy)]
pub struct RustProbe;

impl RustProbe {
    pub fn new() -> Self {
        Self
    }
}

fn unreadable(path: &Path, reason: impl ToString) -> ProbeError {
    ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn color_label(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => "grey",
        _ => "color",
    }
}

impl ImageProbe for RustProbe {
    fn probe(&self, path: &Path) -> Result<TechnicalAttributes, ProbeError> {
        if !path.is_file() {
            return Err(ProbeError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let format = image::guess_format(&bytes).map_err(|e| unreadable(path, e))?;
        let mime_type = format.to_mime_type().to_string();

        if format == ImageFormat::Tiff
            && let Some(tags) = read_tiff_tags(&bytes)
            && tags.width > 0
            && tags.height > 0
        {
            debug!(path = %path.display(), "probed TIFF tags");
            return Ok(TechnicalAttributes {
                mime_type,
                x_resolution: tags.ppi(),
                bit_depth: tags.bits_per_sample,
                samples_per_pixel: tags.samples_per_pixel,
                color_space: tags.color_space().to_string(),
                width: tags.width,
                height: tags.height,
            });
        }

        let decoder = ImageReader::with_format(Cursor::new(&bytes), format)
            .into_decoder()
            .map_err(|e| unreadable(path, e))?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();
        let channels = u32::from(color.channel_count()).max(1);
        let x_resolution = match format {
            ImageFormat::Jpeg => read_jfif_density(&bytes).unwrap_or(0),
            _ => 0,
        };

        debug!(path = %path.display(), ?format, "probed image header");
        Ok(TechnicalAttributes {
            mime_type,
            x_resolution,
            bit_depth: u32::from(color.bits_per_pixel()) / channels,
            samples_per_pixel: channels,
            color_space: color_label(color).to_string(),
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::tiff_tags::tests::tiff_header;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_not_found() {
        let err = RustProbe::new()
            .probe(Path::new("/nonexistent/img001.tif"))
            .unwrap_err();
        assert!(matches!(err, ProbeError::NotFound(_)));
    }

    #[test]
    fn garbage_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("junk.tif");
        std::fs::write(&path, b"not an image at all").unwrap();
        let err = RustProbe::new().probe(&path).unwrap_err();
        assert!(matches!(err, ProbeError::Unreadable { .. }));
    }

    #[test]
    fn probes_tiff_from_tags() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img001.tif");
        std::fs::write(&path, tiff_header(1200, 1600, 8, 1, 1, (400, 1), 2)).unwrap();

        let attrs = RustProbe::new().probe(&path).unwrap();
        assert_eq!(attrs.mime_type, "image/tiff");
        assert_eq!((attrs.width, attrs.height), (1200, 1600));
        assert_eq!(attrs.x_resolution, 400);
        assert_eq!(attrs.bit_depth, 8);
        assert_eq!(attrs.samples_per_pixel, 1);
        assert_eq!(attrs.color_space, "grey");
    }

    #[test]
    fn probes_png_from_decoder_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("page.png");
        image::RgbImage::new(4, 3).save(&path).unwrap();

        let attrs = RustProbe::new().probe(&path).unwrap();
        assert_eq!(attrs.mime_type, "image/png");
        assert_eq!((attrs.width, attrs.height), (4, 3));
        assert_eq!(attrs.bit_depth, 8);
        assert_eq!(attrs.samples_per_pixel, 3);
        assert_eq!(attrs.color_space, "color");
    }
}
