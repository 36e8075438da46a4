use crate::segmentation::Segmentation;
use image::{Rgba, RgbaImage};

/// Opaque black, used for person pixels when the mask feeds a blend
pub const OPAQUE: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Fully transparent black
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Paint `foreground` where the person probability is at least
/// `foreground_threshold` and `background` everywhere else.
pub fn to_binary_mask(
    segmentation: &Segmentation,
    foreground: Rgba<u8>,
    background: Rgba<u8>,
    foreground_threshold: f32,
) -> RgbaImage {
    let (width, height) = segmentation.dimensions();
    let mut mask = RgbaImage::new(width, height);
    for (pixel, &probability) in mask.pixels_mut().zip(segmentation.matte()) {
        *pixel = if probability >= foreground_threshold {
            foreground
        } else {
            background
        };
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, false)]
    #[case(0.49, false)]
    #[case(0.5, true)]
    #[case(1.0, true)]
    fn threshold_is_inclusive(#[case] probability: f32, #[case] is_person: bool) {
        let seg = Segmentation::new(vec![probability], 1, 1);
        let mask = to_binary_mask(&seg, OPAQUE, TRANSPARENT, 0.5);
        let expected = if is_person { OPAQUE } else { TRANSPARENT };
        assert_eq!(*mask.get_pixel(0, 0), expected);
    }

    #[test]
    fn mask_keeps_segmentation_layout() {
        let seg = Segmentation::from_fn(4, 3, |x, _| if x < 2 { 1.0 } else { 0.0 });
        let fg = Rgba([0, 0, 0, 12]);
        let bg = Rgba([0, 0, 0, 15]);
        let mask = to_binary_mask(&seg, fg, bg, 0.5);

        assert_eq!(mask.dimensions(), (4, 3));
        assert_eq!(*mask.get_pixel(1, 2), fg);
        assert_eq!(*mask.get_pixel(2, 0), bg);
    }
}
