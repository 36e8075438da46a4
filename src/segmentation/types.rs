use crate::error::ModelLoadError;
use anyhow::Result;
use clap::ValueEnum;
use image::RgbImage;
use std::path::PathBuf;

/// Alpha matte: grayscale values where 0.0 = background, 1.0 = foreground
/// Flattened in row-major order
pub type Matte = Vec<f32>;

/// Per-pixel person probability for one frame. Lives for a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    matte: Matte,
    width: u32,
    height: u32,
}

impl Segmentation {
    pub fn new(matte: Matte, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            matte.len(),
            (width as usize) * (height as usize),
            "matte length must equal width * height"
        );
        Self {
            matte,
            width,
            height,
        }
    }

    /// Build a segmentation by evaluating `f` at every pixel
    #[cfg(test)]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut matte = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                matte.push(f(x, y));
            }
        }
        Self::new(matte, width, height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn matte(&self) -> &[f32] {
        &self.matte
    }
}

/// Which selfie-segmentation variant to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelType {
    /// 256x256 square input
    General,
    /// 144x256 input, faster
    Landscape,
}

impl ModelType {
    /// Model input (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        match self {
            ModelType::General => (256, 256),
            ModelType::Landscape => (256, 144),
        }
    }
}

/// Execution provider the ONNX session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Runtime {
    Cpu,
    Cuda,
    #[value(name = "tensorrt")]
    TensorRt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterConfig {
    pub runtime: Runtime,
    pub model_asset_path: PathBuf,
    pub model_type: ModelType,
}

/// Trait for segmentation models
/// Allows swapping between different backends (selfie segmentation, test doubles, etc.)
pub trait SegmentationModel: Send {
    /// Classify every pixel of `frame` as person or background
    ///
    /// The returned segmentation has the same dimensions as `frame`.
    fn segment(&mut self, frame: &RgbImage) -> Result<Segmentation>;

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

/// Builds a fresh model context. Called at startup and on every mode switch.
pub trait ModelFactory: Send + Sync {
    fn configure(&self, config: &SegmenterConfig) -> Result<Box<dyn SegmentationModel>, ModelLoadError>;
}
