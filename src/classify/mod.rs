pub mod pipeline;
pub mod types;

pub use pipeline::ClassificationPipeline;
pub use types::{
    ClassifyOptions, ClassifyOutcome, ClassifyStage, ClassifyStats, ClassifyStatus, Fallback,
};
