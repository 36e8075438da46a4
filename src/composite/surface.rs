use image::{Rgb, RgbImage, RgbaImage};

/// Bytes per pixel in the surface buffer (RGBA)
pub const CHANNELS: usize = 4;

/// Position of the alpha byte inside each pixel
pub const ALPHA_OFFSET: usize = 3;

/// RGBA drawing target for one compositor.
///
/// The raw buffer is row-major, 4 channels per pixel, alpha at offset 3.
/// The transparency scan walks it as `(ALPHA_OFFSET..len).step_by(CHANNELS)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSurface {
    image: RgbaImage,
}

impl OutputSurface {
    /// Fully transparent surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    #[cfg(test)]
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// Copy an opaque frame onto the surface (the canvas `drawImage` step).
    ///
    /// The frame must already match the surface dimensions.
    pub fn draw_frame(&mut self, frame: &RgbImage) {
        debug_assert_eq!(frame.dimensions(), self.dimensions());
        for (dst, Rgb([r, g, b])) in self.image.pixels_mut().zip(frame.pixels()) {
            dst.0 = [*r, *g, *b, u8::MAX];
        }
    }
}
