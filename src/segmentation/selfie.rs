use super::preprocess::Preprocessor;
use super::types::{ModelFactory, ModelType, Runtime, SegmentationModel, Segmentation, SegmenterConfig};
use crate::error::ModelLoadError;
use anyhow::{Context, Result};
use image::RgbImage;
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// MediaPipe selfie segmentation exported to ONNX
///
/// Stateless: every frame is classified independently.
pub struct SelfieSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    model_type: ModelType,
}

impl SelfieSegmenter {
    /// Load the model described by `config`
    ///
    /// # Default Configuration
    /// - General: 256x256 input
    /// - Landscape: 256x144 input
    pub fn new(config: &SegmenterConfig) -> Result<Self> {
        let path = config.model_asset_path.as_path();

        tracing::info!(
            "Loading {:?} selfie segmentation model from {} ({:?})",
            config.model_type,
            path.display(),
            config.runtime
        );

        let session = build_session(path, config.runtime)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Selfie segmentation model loaded successfully");

        let (width, height) = config.model_type.input_size();

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            model_type: config.model_type,
        })
    }
}

fn build_session(path: &Path, runtime: Runtime) -> Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    let builder = match runtime {
        Runtime::Cpu => builder,
        Runtime::Cuda => builder.with_execution_providers([CUDAExecutionProvider::default().build()])?,
        Runtime::TensorRt => builder.with_execution_providers([
            TensorRTExecutionProvider::default().build(),
            CUDAExecutionProvider::default().build(),
        ])?,
    };

    Ok(builder.commit_from_file(path)?)
}

/// Matte (width, height) from an output shape, accepting NHWC `[1, H, W, 1]` or NCHW `[1, 1, H, W]`
fn matte_dims(shape: &[i64]) -> Result<(u32, u32)> {
    match shape {
        [1, h, w, 1] => Ok((*w as u32, *h as u32)),
        [1, 1, h, w] => Ok((*w as u32, *h as u32)),
        [1, h, w] => Ok((*w as u32, *h as u32)),
        other => anyhow::bail!("unexpected segmentation output shape {:?}", other),
    }
}

impl SegmentationModel for SelfieSegmenter {
    fn segment(&mut self, frame: &RgbImage) -> Result<Segmentation> {
        let _span = tracing::debug_span!("selfie_segment").entered();

        let input = self.preprocessor.preprocess(frame);
        let (n, h, w, c) = input.dim();
        let shape = [n, h, w, c];
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_array((shape, data)).context("Failed to build input tensor")?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("Failed to run inference")?;
        drop(_infer_span);

        let (out_shape, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract segmentation output")?;
        let dims: Vec<i64> = out_shape.iter().copied().collect();
        let (matte_width, matte_height) = matte_dims(&dims)?;

        let (frame_width, frame_height) = frame.dimensions();
        let matte = Preprocessor::postprocess_matte(
            values,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )?;

        Ok(Segmentation::new(matte, frame_width, frame_height))
    }

    fn input_size(&self) -> (u32, u32) {
        self.model_type.input_size()
    }
}

/// Factory that loads a [`SelfieSegmenter`] on every call
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfieSegmenterFactory;

impl ModelFactory for SelfieSegmenterFactory {
    fn configure(&self, config: &SegmenterConfig) -> Result<Box<dyn SegmentationModel>, ModelLoadError> {
        let model = SelfieSegmenter::new(config).map_err(|err| ModelLoadError {
            path: config.model_asset_path.clone(),
            reason: format!("{err:#}"),
        })?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn matte_dims_accepts_both_layouts() {
        assert_eq!(matte_dims(&[1, 144, 256, 1]).unwrap(), (256, 144));
        assert_eq!(matte_dims(&[1, 1, 256, 256]).unwrap(), (256, 256));
        assert_eq!(matte_dims(&[1, 10, 20]).unwrap(), (20, 10));
        assert!(matte_dims(&[2, 3]).is_err());
    }

    #[test]
    fn missing_model_is_a_load_error() {
        let config = SegmenterConfig {
            runtime: Runtime::Cpu,
            model_asset_path: PathBuf::from("/nonexistent/selfie_segmentation.onnx"),
            model_type: ModelType::General,
        };
        let err = match SelfieSegmenterFactory.configure(&config) {
            Ok(_) => panic!("loading a missing model must fail"),
            Err(err) => err,
        };
        assert_eq!(err.path, config.model_asset_path);
        assert!(err.to_string().contains("selfie_segmentation.onnx"));
    }
}
