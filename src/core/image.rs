use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Luma};
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Side of the raster fed to the perceptual hash.
pub const FINE_SIZE: usize = 32;
/// Side of the raster fed to the difference hashes.
pub const COARSE_SIZE: usize = 8;

/// Square 8-bit grayscale raster, row-major (`raster[row][col]`).
pub type Raster<const N: usize> = [[u8; N]; N];

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image has no pixels: {path}")]
    Empty { path: String },
}

/// Everything the fingerprint extractor needs from one decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rasters {
    pub width: u32,
    pub height: u32,
    pub fine: Raster<FINE_SIZE>,
    pub coarse: Raster<COARSE_SIZE>,
}

/// Turns an image file into small grayscale rasters.
///
/// Implementations must report unreadable or corrupt input as an error and
/// never panic on it; the extraction pool shares one instance across threads.
pub trait Preprocessor: Sync {
    fn preprocess(&self, path: &Path) -> Result<Rasters, PreprocessError>;
}

/// Decodes with the `image` crate and downsamples in linear light.
#[derive(Debug, Clone)]
pub struct SrgbPreprocessor {
    filter: FilterType,
}

impl SrgbPreprocessor {
    pub fn new() -> Self {
        Self {
            filter: FilterType::CatmullRom,
        }
    }

    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    /// Build both rasters from an already decoded image.
    pub fn rasters_from_image(&self, img: &DynamicImage) -> Rasters {
        let (width, height) = img.dimensions();
        let lut = srgb_to_linear_lut();
        let luma = img.to_luma8();
        let linear: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_fn(width, height, |x, y| {
                Luma([lut[luma.get_pixel(x, y)[0] as usize]])
            });

        Rasters {
            width,
            height,
            fine: self.resample::<FINE_SIZE>(&linear),
            coarse: self.resample::<COARSE_SIZE>(&linear),
        }
    }

    fn resample<const N: usize>(&self, linear: &ImageBuffer<Luma<f32>, Vec<f32>>) -> Raster<N> {
        let small = imageops::resize(linear, N as u32, N as u32, self.filter);
        let mut raster = [[0u8; N]; N];
        for (x, y, pixel) in small.enumerate_pixels() {
            raster[y as usize][x as usize] = linear_to_srgb(pixel[0]);
        }
        raster
    }
}

impl Default for SrgbPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for SrgbPreprocessor {
    fn preprocess(&self, path: &Path) -> Result<Rasters, PreprocessError> {
        // Magic bytes win over the extension; unknown content falls back to it.
        let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        if img.width() == 0 || img.height() == 0 {
            return Err(PreprocessError::Empty {
                path: path.to_string_lossy().to_string(),
            });
        }
        Ok(self.rasters_from_image(&img))
    }
}

fn srgb_to_linear_lut() -> &'static [f32; 256] {
    static LUT: OnceLock<[f32; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [0.0f32; 256];
        for (i, slot) in lut.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *slot = if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        lut
    })
}

fn linear_to_srgb(linear: f32) -> u8 {
    let l = linear.clamp(0.0, 1.0);
    let c = if l <= 0.003_130_8 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    };
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}
