use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB frames to selfie-segmentation input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NHWC tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Lay out as NHWC (channels last, as the MediaPipe graph expects)
    ///
    /// Returns: Array4<f32> with shape [1, height, width, 3]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        Array4::from_shape_fn((1, height as usize, width as usize, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }

    /// Postprocess model output matte back to original frame dimensions
    ///
    /// # Arguments
    /// * `matte` - Flattened matte at model resolution
    /// * `matte_width` - Width of the matte
    /// * `matte_height` - Height of the matte
    /// * `target_width` - Desired output width
    /// * `target_height` - Desired output height
    ///
    /// Returns: Resized matte flattened in row-major order
    pub fn postprocess_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("postprocess").entered();

        anyhow::ensure!(
            matte.len() == (matte_width * matte_height) as usize,
            "matte has {} values, expected {}x{}",
            matte.len(),
            matte_width,
            matte_height
        );

        if matte_width == target_width && matte_height == target_height {
            return Ok(matte.iter().map(|v| v.clamp(0.0, 1.0)).collect());
        }

        // Resize in floating point so probabilities near the threshold survive
        let buffer: image::ImageBuffer<image::Luma<f32>, Vec<f32>> =
            image::ImageBuffer::from_fn(matte_width, matte_height, |x, y| {
                let idx = (y * matte_width + x) as usize;
                image::Luma([matte[idx].clamp(0.0, 1.0)])
            });

        let resized = imageops::resize(
            &buffer,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        Ok(resized.pixels().map(|p| p[0].clamp(0.0, 1.0)).collect())
    }

    /// Convert matte to grayscale RGB image for visualization
    pub fn matte_to_rgb(matte: &[f32], width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            let value = (matte[idx] * 255.0).clamp(0.0, 255.0) as u8;
            image::Rgb([value, value, value])
        })
    }
}
