pub mod geometry;
pub mod loader;
pub mod postprocessing;
pub mod preprocessing;
pub mod transforms;
pub mod types;

pub use geometry::{CropRect, CropRegion};
pub use loader::ImageLoader;
pub use postprocessing::{DisplayPayload, ResultFormatter};
pub use preprocessing::{ImagePreprocessor, ProcessingConfig};
pub use transforms::ImageTransforms;
pub use types::{ProcessedImage, RawImage};
