//! Separable Gaussian blur over interleaved 8-bit pixel buffers.
//!
//! The blur "amount" is the kernel sigma in pixels, like the CSS `blur()`
//! filter. Edges are clamped.

/// Kernel radius for a given sigma. Non-decreasing in `amount`; 0 for no blur.
pub fn kernel_radius(amount: u32) -> usize {
    (amount as usize).saturating_mul(3)
}

/// Normalized 1D Gaussian kernel of length `2 * radius + 1`.
fn gaussian_kernel_1d(sigma: u32, radius: usize) -> Vec<f32> {
    if sigma == 0 || radius == 0 {
        return vec![1.0];
    }
    let two_sigma_sq = 2.0 * (sigma as f64).powi(2);
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|&v| (v / sum) as f32).collect()
}

/// Blur `data` in place. Amount 0 leaves the buffer untouched.
///
/// The kernel never reaches further than the longer image side, so large
/// amounts cost at most a full-width pass per pixel.
pub fn blur_in_place(data: &mut [u8], width: usize, height: usize, channels: usize, amount: u32) {
    if width == 0 || height == 0 {
        return;
    }
    let radius = kernel_radius(amount).min(width.max(height));
    let kernel = gaussian_kernel_1d(amount, radius);
    if kernel.len() <= 1 {
        return;
    }

    let mut rows = vec![0.0f32; data.len()];
    let src: Vec<f32> = data.iter().map(|&v| v as f32).collect();
    convolve(&src, &mut rows, width, height, channels, &kernel, Axis::Horizontal);

    let mut cols = vec![0.0f32; data.len()];
    convolve(&rows, &mut cols, width, height, channels, &kernel, Axis::Vertical);

    for (out, v) in data.iter_mut().zip(cols) {
        *out = v.round().clamp(0.0, 255.0) as u8;
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// One clamped 1D pass of `kernel` along `axis`, from `src` into `dst`.
fn convolve(
    src: &[f32],
    dst: &mut [f32],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    axis: Axis,
) {
    let radius = (kernel.len() / 2) as isize;
    let (len, stride) = match axis {
        Axis::Horizontal => (width, channels),
        Axis::Vertical => (height, width * channels),
    };
    let last = len as isize - 1;

    for y in 0..height {
        for x in 0..width {
            let pos = match axis {
                Axis::Horizontal => x,
                Axis::Vertical => y,
            } as isize;
            // Start of the line this pixel sits on
            let line = (y * width + x) * channels - pos as usize * stride;
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let s = (pos + k as isize - radius).clamp(0, last) as usize;
                    acc += src[line + s * stride + c] * w;
                }
                dst[(y * width + x) * channels + c] = acc;
            }
        }
    }
}
