use crate::composite::{CompositeMode, CompositeParameters, OutputSurface};
use image::{imageops, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::PathBuf;

/// Preset background images shown behind the surface in image mode.
///
/// Image `id` lives at `<assets_dir>/bg<id>.jpg` and is scaled to the surface size on first use.
pub struct BackdropLibrary {
    assets_dir: PathBuf,
    width: u32,
    height: u32,
    // None caches a failed load so it is only reported once
    cache: HashMap<u32, Option<RgbImage>>,
}

impl BackdropLibrary {
    pub fn new(assets_dir: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            width,
            height,
            cache: HashMap::new(),
        }
    }

    pub fn path_for(&self, id: u32) -> PathBuf {
        self.assets_dir.join(format!("bg{id}.jpg"))
    }

    /// Backdrop for the current parameters; blur mode has none
    pub fn backdrop_for(&mut self, params: &CompositeParameters) -> Option<&RgbImage> {
        match (params.mode, params.background_image_id) {
            (CompositeMode::Image, Some(id)) => self.get(id),
            _ => None,
        }
    }

    pub fn get(&mut self, id: u32) -> Option<&RgbImage> {
        if !self.cache.contains_key(&id) {
            let loaded = self.load(id);
            self.cache.insert(id, loaded);
        }
        self.cache.get(&id).and_then(Option::as_ref)
    }

    fn load(&self, id: u32) -> Option<RgbImage> {
        let path = self.path_for(id);
        match image::open(&path) {
            Ok(image) => {
                tracing::info!("Loaded background {} from {}", id, path.display());
                Some(imageops::resize(
                    &image.to_rgb8(),
                    self.width,
                    self.height,
                    imageops::FilterType::Lanczos3,
                ))
            }
            Err(err) => {
                tracing::warn!("Background {} unavailable at {}: {}", id, path.display(), err);
                None
            }
        }
    }
}

/// Draw `surface` over `backdrop` (black when absent), dropping alpha.
pub fn flatten_over(surface: &OutputSurface, backdrop: Option<&RgbImage>) -> RgbImage {
    let (width, height) = surface.dimensions();
    let backdrop = backdrop.filter(|b| b.dimensions() == (width, height));
    RgbImage::from_fn(width, height, |x, y| {
        let top = surface.image().get_pixel(x, y);
        let bottom = backdrop.map_or(Rgb([0, 0, 0]), |b| *b.get_pixel(x, y));
        let a = top[3] as u32;
        let mut out = [0u8; 3];
        for (c, v) in out.iter_mut().enumerate() {
            *v = ((top[c] as u32 * a + bottom[c] as u32 * (255 - a) + 127) / 255) as u8;
        }
        Rgb(out)
    })
}
