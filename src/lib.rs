pub mod classify;
pub mod config;
pub mod image;
pub mod models;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use classify::{ClassificationPipeline, ClassifyOptions, ClassifyOutcome};
pub use config::Config;
pub use crate::image::{DisplayPayload, ImagePreprocessor, ProcessedImage, ProcessingConfig, RawImage};
pub use models::{Classifier, ModelManager, ModelSelector};
pub use utils::error::ClassifyError;

pub type Result<T> = std::result::Result<T, ClassifyError>;
