use super::gaussian;
use super::mask::{to_binary_mask, OPAQUE, TRANSPARENT};
use super::surface::{OutputSurface, ALPHA_OFFSET, CHANNELS};
use crate::error::CompositeError;
use crate::segmentation::Segmentation;
use image::{imageops, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BokehOptions {
    pub foreground_threshold: f32,
    pub background_blur_amount: u32,
    pub edge_blur_amount: u32,
    pub flip_horizontal: bool,
}

/// Draw `image` over a blurred copy of itself, keeping the person sharp.
///
/// The person mask is softened by `edge_blur_amount` and used as the blend
/// weight. Color channels are blended; alpha is taken from `image` unchanged,
/// so an opaque frame yields an opaque surface and a cut-out keeps its holes.
pub fn composite_blur(
    surface: &mut OutputSurface,
    image: &RgbaImage,
    segmentation: &Segmentation,
    options: &BokehOptions,
) -> Result<(), CompositeError> {
    let _span = tracing::debug_span!("composite_blur", blur = options.background_blur_amount).entered();

    let dims = surface.dimensions();
    CompositeError::check("image", dims, image.dimensions())?;
    CompositeError::check("segmentation", dims, segmentation.dimensions())?;

    let (width, height) = (dims.0 as usize, dims.1 as usize);

    let mut blurred = image.as_raw().clone();
    gaussian::blur_in_place(&mut blurred, width, height, CHANNELS, options.background_blur_amount);

    let weights = person_weights(segmentation, options.foreground_threshold, options.edge_blur_amount);

    let source = image.as_raw();
    let out = surface.pixels_mut();
    for (i, &w) in weights.iter().enumerate() {
        let base = i * CHANNELS;
        for c in 0..ALPHA_OFFSET {
            let idx = base + c;
            out[idx] = match w {
                u8::MAX => source[idx],
                0 => blurred[idx],
                _ => {
                    let a = w as f32 / 255.0;
                    (a * source[idx] as f32 + (1.0 - a) * blurred[idx] as f32)
                        .round()
                        .clamp(0.0, 255.0) as u8
                }
            };
        }
        out[base + ALPHA_OFFSET] = source[base + ALPHA_OFFSET];
    }

    if options.flip_horizontal {
        imageops::flip_horizontal_in_place(surface.image_mut());
    }

    Ok(())
}

/// One weight per pixel: 255 inside the person, 0 outside, soft across the edge
fn person_weights(segmentation: &Segmentation, threshold: f32, edge_blur_amount: u32) -> Vec<u8> {
    let (width, height) = segmentation.dimensions();
    let mask = to_binary_mask(segmentation, OPAQUE, TRANSPARENT, threshold);
    let mut weights: Vec<u8> = mask.pixels().map(|p| p[3]).collect();
    gaussian::blur_in_place(&mut weights, width as usize, height as usize, 1, edge_blur_amount);
    weights
}
