use super::bokeh::{composite_blur, BokehOptions};
use super::mask::to_binary_mask;
use super::params::CompositeParameters;
use super::surface::{OutputSurface, ALPHA_OFFSET, CHANNELS};
use crate::error::CompositeError;
use crate::segmentation::Segmentation;
use image::{Rgba, RgbImage};

/// Mask alpha written for person pixels in image mode
pub const FOREGROUND_SENTINEL: u8 = 12;

/// Mask alpha written for background pixels in image mode. Only this value is checked.
pub const BACKGROUND_SENTINEL: u8 = 15;

/// Fixed blur of the edge-softening pass that follows the image-mode cut-out
pub const IMAGE_EDGE_SOFTEN_BLUR: u32 = 10;

/// Renders one frame and its segmentation onto an owned surface.
///
/// Rendering is a pure function of (frame, segmentation, params): no state
/// carries over between cycles except the surface contents themselves,
/// which every cycle overwrites completely.
pub struct FrameCompositor {
    surface: OutputSurface,
}

impl FrameCompositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: OutputSurface::new(width, height),
        }
    }

    pub fn surface(&self) -> &OutputSurface {
        &self.surface
    }

    /// Sharp person over a blurred copy of the frame
    pub fn run_blur_cycle(
        &mut self,
        frame: &RgbImage,
        segmentation: &Segmentation,
        params: &CompositeParameters,
    ) -> Result<(), CompositeError> {
        let _span = tracing::debug_span!("blur_cycle", blur = params.blur_amount).entered();

        self.draw_base(frame)?;
        let base = self.surface.image().clone();

        composite_blur(
            &mut self.surface,
            &base,
            segmentation,
            &BokehOptions {
                foreground_threshold: params.foreground_threshold,
                background_blur_amount: params.blur_amount,
                edge_blur_amount: params.edge_blur_amount,
                flip_horizontal: false,
            },
        )
    }

    /// Person with background pixels made fully transparent, so the backdrop shows through
    pub fn run_image_cycle(
        &mut self,
        frame: &RgbImage,
        segmentation: &Segmentation,
        params: &CompositeParameters,
    ) -> Result<(), CompositeError> {
        let _span = tracing::debug_span!("image_cycle", background = ?params.background_image_id).entered();

        self.draw_base(frame)?;
        CompositeError::check("segmentation", self.surface.dimensions(), segmentation.dimensions())?;

        let mask = to_binary_mask(
            segmentation,
            Rgba([0, 0, 0, FOREGROUND_SENTINEL]),
            Rgba([0, 0, 0, BACKGROUND_SENTINEL]),
            params.foreground_threshold,
        );

        // Alpha byte of every pixel: offset 3, stride 4, same flat index in both buffers
        let mask = mask.as_raw();
        let pixels = self.surface.pixels_mut();
        for i in (ALPHA_OFFSET..pixels.len()).step_by(CHANNELS) {
            if mask[i] == BACKGROUND_SENTINEL {
                pixels[i] = 0;
            }
        }

        let cutout = self.surface.image().clone();
        composite_blur(
            &mut self.surface,
            &cutout,
            segmentation,
            &BokehOptions {
                foreground_threshold: params.foreground_threshold,
                background_blur_amount: IMAGE_EDGE_SOFTEN_BLUR,
                edge_blur_amount: params.edge_blur_amount,
                flip_horizontal: false,
            },
        )
    }

    fn draw_base(&mut self, frame: &RgbImage) -> Result<(), CompositeError> {
        CompositeError::check("frame", self.surface.dimensions(), frame.dimensions())?;
        self.surface.draw_frame(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::params::{BlurLevel, CompositeMode};
    use image::Rgb;
    use rstest::rstest;

    const W: u32 = 64;
    const H: u32 = 48;

    fn flat_frame() -> RgbImage {
        RgbImage::from_pixel(W, H, Rgb([40, 120, 200]))
    }

    /// Flat left half, checkerboard right half
    fn textured_frame() -> RgbImage {
        RgbImage::from_fn(W, H, |x, y| {
            if x < W / 2 {
                Rgb([40, 120, 200])
            } else if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn left_half_person() -> Segmentation {
        Segmentation::from_fn(W, H, |x, _| if x < W / 2 { 1.0 } else { 0.0 })
    }

    fn blur_params(amount: u32) -> CompositeParameters {
        CompositeParameters {
            blur_amount: amount,
            ..CompositeParameters::default()
        }
    }

    fn image_params(id: u32) -> CompositeParameters {
        CompositeParameters {
            mode: CompositeMode::Image,
            background_image_id: Some(id),
            ..CompositeParameters::default()
        }
    }

    /// Mean absolute difference between neighbours across the right half
    fn background_contrast(compositor: &FrameCompositor) -> f64 {
        let image = compositor.surface().image();
        let mut total = 0.0;
        let mut count = 0.0;
        for y in 0..H {
            for x in (W / 2 + 12)..(W - 1) {
                total += (image.get_pixel(x, y)[0] as f64 - image.get_pixel(x + 1, y)[0] as f64).abs();
                count += 1.0;
            }
        }
        total / count
    }

    #[test]
    fn no_blur_on_flat_frame_is_identical_to_source() {
        let frame = flat_frame();
        let mut compositor = FrameCompositor::new(W, H);
        compositor
            .run_blur_cycle(&frame, &left_half_person(), &blur_params(0))
            .unwrap();

        for (x, y, p) in compositor.surface().image().enumerate_pixels() {
            let src = frame.get_pixel(x, y);
            assert_eq!(p.0, [src[0], src[1], src[2], 255], "pixel ({x}, {y})");
        }
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(5)]
    #[case(10)]
    fn foreground_is_unchanged_at_every_level(#[case] amount: u32) {
        let frame = textured_frame();
        let mut compositor = FrameCompositor::new(W, H);
        compositor
            .run_blur_cycle(&frame, &left_half_person(), &blur_params(amount))
            .unwrap();

        // Beyond the 3-sigma reach of the edge softening
        for y in 0..H {
            for x in 0..(W / 2 - 10) {
                let src = frame.get_pixel(x, y);
                assert_eq!(compositor.surface().image().get_pixel(x, y).0, [src[0], src[1], src[2], 255]);
            }
        }
    }

    #[test]
    fn background_blur_grows_with_amount() {
        let frame = textured_frame();
        let contrast = |amount| {
            let mut compositor = FrameCompositor::new(W, H);
            compositor
                .run_blur_cycle(&frame, &left_half_person(), &blur_params(amount))
                .unwrap();
            background_contrast(&compositor)
        };

        let none = contrast(0);
        let low = contrast(3);
        let high = contrast(10);
        assert!(none > 200.0, "checkerboard should be intact, got {none}");
        assert!(low < none / 4.0, "low blur left contrast {low}");
        assert!(high < none / 4.0, "high blur left contrast {high}");
    }

    #[test]
    fn background_contrast_is_non_increasing_in_blur_amount() {
        const SW: u32 = 128;
        const SH: u32 = 8;
        // 8 px wide vertical stripes, no person anywhere
        let frame = RgbImage::from_fn(SW, SH, |x, _| {
            if (x / 8) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let empty = Segmentation::from_fn(SW, SH, |_, _| 0.0);

        let range = |level: BlurLevel| {
            let mut compositor = FrameCompositor::new(SW, SH);
            compositor
                .run_blur_cycle(&frame, &empty, &blur_params(level.amount()))
                .unwrap();
            let image = compositor.surface().image();
            // Clear of the clamped borders at the widest kernel
            let row: Vec<u8> = (40..88).map(|x| image.get_pixel(x, SH / 2)[0]).collect();
            row.iter().max().unwrap() - row.iter().min().unwrap()
        };

        let none = range(BlurLevel::None);
        let low = range(BlurLevel::Low);
        let medium = range(BlurLevel::Medium);
        let high = range(BlurLevel::High);
        assert_eq!(none, 255);
        assert!(low < none, "low {low}");
        assert!(medium < low, "medium {medium}, low {low}");
        assert!(high <= medium, "high {high}, medium {medium}");
        assert!(high <= low);
        assert!(high < 10, "high {high}");
    }

    #[test]
    fn image_cycle_clears_exactly_the_background_alpha() {
        let frame = textured_frame();
        let segmentation = Segmentation::from_fn(W, H, |x, y| if x < W / 2 && y > 4 { 0.8 } else { 0.2 });
        let params = image_params(2);

        let mut compositor = FrameCompositor::new(W, H);
        compositor.run_image_cycle(&frame, &segmentation, &params).unwrap();

        let mask = to_binary_mask(
            &segmentation,
            Rgba([0, 0, 0, FOREGROUND_SENTINEL]),
            Rgba([0, 0, 0, BACKGROUND_SENTINEL]),
            params.foreground_threshold,
        );
        for (x, y, p) in compositor.surface().image().enumerate_pixels() {
            let is_background = mask.get_pixel(x, y)[3] == BACKGROUND_SENTINEL;
            assert_eq!(p[3] == 0, is_background, "pixel ({x}, {y})");
            if !is_background {
                assert_eq!(p[3], 255);
            }
        }
    }

    #[test]
    fn image_cycle_keeps_person_colors() {
        let frame = textured_frame();
        let mut compositor = FrameCompositor::new(W, H);
        compositor
            .run_image_cycle(&frame, &left_half_person(), &image_params(1))
            .unwrap();

        let src = frame.get_pixel(2, 2);
        assert_eq!(compositor.surface().image().get_pixel(2, 2).0, [src[0], src[1], src[2], 255]);
    }

    #[rstest]
    #[case(blur_params(5))]
    #[case(image_params(3))]
    fn cycles_are_idempotent(#[case] params: CompositeParameters) {
        let frame = textured_frame();
        let segmentation = left_half_person();

        let mut compositor = FrameCompositor::new(W, H);
        let run = |compositor: &mut FrameCompositor| {
            let result = match params.mode {
                CompositeMode::Blur => compositor.run_blur_cycle(&frame, &segmentation, &params),
                CompositeMode::Image => compositor.run_image_cycle(&frame, &segmentation, &params),
            };
            result.unwrap();
            compositor.surface().clone()
        };

        let first = run(&mut compositor);
        let second = run(&mut compositor);
        let fresh = run(&mut FrameCompositor::new(W, H));
        assert_eq!(first, second);
        assert_eq!(first, fresh);
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let mut compositor = FrameCompositor::new(W, H);
        let frame = RgbImage::new(W / 2, H);
        let err = compositor
            .run_blur_cycle(&frame, &left_half_person(), &blur_params(3))
            .unwrap_err();
        assert!(matches!(err, CompositeError::DimensionMismatch { what: "frame", .. }));
    }
}
