//! Technical image inspection.
//!
//! | Attribute | Source |
//! |---|---|
//! | **Format / MIME** | `image::guess_format` on the file header |
//! | **Width, height, depth, color (TIFF)** | custom IFD reader ([`tiff_tags`]) |
//! | **Resolution (TIFF)** | `XResolution` + `ResolutionUnit`, normalized to PPI |
//! | **Resolution (JPEG)** | JFIF `APP0` density |
//! | **Everything else** | `image` decoder header (`dimensions`, `color_type`) |
//!
//! The module is split into:
//! - **Probe**: [`ImageProbe`] trait, the seam the exporters depend on
//! - **RustProbe**: production implementation, pure Rust
//! - **Tiff tags**: byte-level TIFF/JFIF header reading

pub mod probe;
pub mod rust_probe;
pub(crate) mod tiff_tags;

pub use probe::{ImageProbe, ProbeError};
pub use rust_probe::RustProbe;
