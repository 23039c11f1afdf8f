//! Decoding and encoding between raw image bytes and BGR pixel arrays.
//!
//! Everything past this boundary works on `(height, width, 3)` arrays in BGR
//! channel order, matching the layout the model was trained on. The reversal
//! happens once on decode and once on encode.

use std::{fs, io::Cursor, path::Path};

use image::{ImageFormat, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::{
    errors::{Result, SegmentError},
    RasterImage,
};

/// Decode raw bytes into a `(H, W, 3)` BGR array.
pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
    let rgb = image::load_from_memory(bytes)
        .map_err(|e| SegmentError::ImageDecode {
            message: e.to_string(),
        })?
        .to_rgb8();
    // nshare yields (channels, height, width); move channels last and reverse
    // the channel axis for BGR.
    let bgr = rgb
        .as_ndarray3()
        .permuted_axes([1, 2, 0])
        .slice_move(s![.., .., ..;-1])
        .to_owned();
    Ok(bgr)
}

/// Encode a BGR array as PNG bytes.
pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>> {
    let buffer = to_rgb_buffer(image)?;
    let mut bytes = Cursor::new(Vec::new());
    buffer.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Read and decode an image file.
pub fn read_image(path: &Path) -> Result<RasterImage> {
    let bytes = fs::read(path).map_err(|e| SegmentError::FileSystem {
        path: path.to_path_buf(),
        operation: "reading input image".to_string(),
        source: e,
    })?;
    decode(&bytes)
}

/// Encode a BGR array and write it to `path`, with the format inferred from
/// the path's extension.
pub fn write_image(path: &Path, image: &RasterImage) -> Result<()> {
    let buffer = to_rgb_buffer(image)?;
    buffer
        .save(path)
        .map_err(|e| SegmentError::ImageProcessing {
            operation: format!("saving image to {}", path.display()),
            source: Box::new(e),
        })
}

fn to_rgb_buffer(image: &RasterImage) -> Result<RgbImage> {
    let (height, width, channels) = image.dim();
    if channels != 3 {
        return Err(SegmentError::Validation {
            field: "image".to_string(),
            reason: format!("expected 3 channels, got {channels}"),
        });
    }
    let data: Vec<u8> = image.slice(s![.., .., ..;-1]).iter().copied().collect();
    RgbImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
        SegmentError::ImageProcessing {
            operation: "raster to pixel buffer conversion".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "buffer length does not match dimensions",
            )),
        }
    })
}
