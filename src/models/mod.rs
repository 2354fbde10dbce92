pub mod classifier;
pub mod manager;
pub mod result;
pub mod selector;

pub use classifier::{Classifier, OnnxClassifier};
pub use manager::{ModelManager, ModelStats, ModelStatus};
pub use result::{Classification, ClassificationResult};
pub use selector::{ModelSelector, ModelSpec};
