use ndarray::Array3;

use crate::{ProtoErr, Result};

/// Decodes an encoded image (PNG, JPEG, GIF or BMP) into `(height, width, 3)` RGB pixels.
///
/// The dimensions come from the image itself, other color types are converted to RGB.
///
/// # Returns
/// The pixels or `ImageDecode` if the bytes are not a supported image.
pub fn decode_rgb(bytes: &[u8]) -> Result<Array3<u8>> {
    let rgb = image::load_from_memory(bytes)
        .map_err(|e| ProtoErr::ImageDecode(e.to_string()))?
        .to_rgb8();

    let (width, height) = rgb.dimensions();
    Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())
        .map_err(|e| ProtoErr::ImageDecode(e.to_string()))
}
