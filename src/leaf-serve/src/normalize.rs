use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::{Error, Result};

pub const HEIGHT: u32 = 224;
pub const WIDTH: u32 = 224;
pub const CHANNELS: u32 = 3;

/// NHWC input shape of the leaf model
pub const SHAPE: [usize; 4] = [1, HEIGHT as usize, WIDTH as usize, CHANNELS as usize];

const UNSUPPORTED_FORMAT: &str = "Unsupported image format. Please upload a JPG or PNG.";

/// A single-item batch of RGB pixels scaled to [0, 1], laid out as
/// (1, 224, 224, 3).
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedImage {
    data: Vec<f32>,
}

impl NormalizedImage {
    pub fn shape(&self) -> [usize; 4] {
        SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Decode raw bytes into an RGB image, dropping alpha and palette data.
///
/// The container format is guessed from the content, so a text file with a
/// `.jpg` name is rejected here.
pub fn decode(data: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(data).map_err(|err| {
        log::debug!("image decode failed: {}", err);
        Error::UnsupportedFormat(UNSUPPORTED_FORMAT.to_owned())
    })?;

    Ok(image.to_rgb8())
}

/// Stretch to 224x224 with bicubic (Catmull-Rom) resampling, the filter
/// the model saw during training, and scale every channel value by 1/255.
pub fn resize_and_scale(rgb: &RgbImage) -> NormalizedImage {
    let resized = imageops::resize(rgb, WIDTH, HEIGHT, FilterType::CatmullRom);

    let data: Vec<f32> = resized
        .into_raw()
        .iter()
        .map(|x| *x as f32 / 255f32)
        .collect();

    NormalizedImage { data }
}

pub fn normalize(data: &[u8]) -> Result<NormalizedImage> {
    let rgb = decode(data)?;
    Ok(resize_and_scale(&rgb))
}

pub fn normalize_path(path: &Path) -> Result<NormalizedImage> {
    let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    normalize(&data)
}
