mod preprocess;
mod selfie;
pub mod types;

pub use preprocess::Preprocessor;
pub use selfie::SelfieSegmenterFactory;
pub use types::{ModelFactory, ModelType, Runtime, SegmentationModel, Segmentation, SegmenterConfig};
