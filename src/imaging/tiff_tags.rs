//! Minimal TIFF header reader.
//!
//! Reads the baseline tags of the first IFD that describe a master scan:
//!
//! | Tag | Name | Used for |
//! |-----|------|----------|
//! | 256 | ImageWidth | width |
//! | 257 | ImageLength | height |
//! | 258 | BitsPerSample | bit depth (first sample) |
//! | 262 | PhotometricInterpretation | bitonal / grey / color |
//! | 277 | SamplesPerPixel | channel count |
//! | 282 | XResolution | resolution (RATIONAL) |
//! | 296 | ResolutionUnit | 2 = inch, 3 = centimeter |
//!
//! Also reads the pixel density of a JPEG's JFIF `APP0` segment. Neither
//! reader decodes pixel data. Every offset is bounds-checked; a truncated or
//! foreign file yields `None` rather than an error.

/// Baseline TIFF tags of the first image directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiffTags {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u32,
    pub samples_per_pixel: u32,
    pub photometric: Option<u16>,
    /// XResolution as a float, in `resolution_unit`s.
    pub x_resolution: Option<f64>,
    pub resolution_unit: u16,
}

impl TiffTags {
    /// Horizontal resolution in pixels per inch, rounded.
    pub fn ppi(&self) -> u32 {
        let Some(res) = self.x_resolution else {
            return 0;
        };
        let ppi = match self.resolution_unit {
            3 => res * 2.54,
            _ => res,
        };
        ppi.round() as u32
    }

    /// `bitonal`, `grey` or `color`.
    pub fn color_space(&self) -> &'static str {
        if self.bits_per_sample == 1 {
            return "bitonal";
        }
        match (self.photometric, self.samples_per_pixel) {
            (Some(0 | 1), _) => "grey",
            (None, 1) => "grey",
            _ => "color",
        }
    }
}

struct Bytes<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl Bytes<'_> {
    fn u16(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset + 2)?;
        Some(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn u32(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset + 4)?;
        Some(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }
}

// TIFF field types
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

/// Read the baseline tags of a TIFF file. `None` if this is not a TIFF.
pub fn read_tiff_tags(data: &[u8]) -> Option<TiffTags> {
    let big_endian = match data.get(0..2)? {
        b"MM" => true,
        b"II" => false,
        _ => return None,
    };
    let bytes = Bytes { data, big_endian };

    // TIFF magic
    if bytes.u16(2)? != 42 {
        return None;
    }

    let ifd = bytes.u32(4)? as usize;
    let entry_count = bytes.u16(ifd)? as usize;
    let mut tags = TiffTags {
        resolution_unit: 2,
        ..TiffTags::default()
    };

    for i in 0..entry_count {
        let entry = ifd + 2 + i * 12;
        let tag = bytes.u16(entry)?;
        let typ = bytes.u16(entry + 2)?;
        let count = bytes.u32(entry + 4)? as usize;

        // First value of a SHORT or LONG field. Values up to four bytes sit
        // inline in the entry; longer arrays live at the offset.
        let scalar = || -> Option<u32> {
            match typ {
                SHORT if count <= 2 => bytes.u16(entry + 8).map(u32::from),
                SHORT => bytes.u16(bytes.u32(entry + 8)? as usize).map(u32::from),
                LONG if count <= 1 => bytes.u32(entry + 8),
                LONG => bytes.u32(bytes.u32(entry + 8)? as usize),
                _ => None,
            }
        };

        match tag {
            256 => tags.width = scalar()?,
            257 => tags.height = scalar()?,
            258 => tags.bits_per_sample = scalar()?,
            262 => tags.photometric = scalar().map(|v| v as u16),
            277 => tags.samples_per_pixel = scalar()?,
            282 if typ == RATIONAL => {
                let at = bytes.u32(entry + 8)? as usize;
                let num = bytes.u32(at)?;
                let den = bytes.u32(at + 4)?;
                if den != 0 {
                    tags.x_resolution = Some(f64::from(num) / f64::from(den));
                }
            }
            296 => tags.resolution_unit = scalar()? as u16,
            _ => {}
        }
    }

    if tags.samples_per_pixel == 0 {
        tags.samples_per_pixel = 1;
    }
    if tags.bits_per_sample == 0 {
        tags.bits_per_sample = 1;
    }
    Some(tags)
}

/// Pixel density of a JPEG from its JFIF header, in PPI.
///
/// APP0 layout after the marker and length: `"JFIF\0"`, version (2),
/// units (1: 0 = aspect only, 1 = inch, 2 = cm), Xdensity (2, big-endian).
pub fn read_jfif_density(data: &[u8]) -> Option<u32> {
    if data.get(0..2)? != [0xFF, 0xD8] {
        return None;
    }
    let seg = data.get(2..)?;
    if seg.get(0..2)? != [0xFF, 0xE0] || seg.get(4..9)? != b"JFIF\0" {
        return None;
    }
    let units = *seg.get(11)?;
    let density = u16::from_be_bytes([*seg.get(12)?, *seg.get(13)?]);
    match units {
        1 => Some(u32::from(density)),
        2 => Some((f64::from(density) * 2.54).round() as u32),
        _ => None,
    }
}
