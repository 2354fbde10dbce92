use crate::image::ProcessedImage;
use crate::models::{Classification, ClassificationResult, ModelSelector, ModelSpec};
use crate::utils::error::ClassifyError;
use crate::{Config, Result};
use image::imageops::{self, FilterType};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// 图像分类器接口，三个模型共用
pub trait Classifier: Send + Sync {
    /// 该分类器对应的模型
    fn model(&self) -> ModelSelector;

    /// 返回按置信度降序排列的结果
    fn classify(&self, image: &ProcessedImage) -> Result<ClassificationResult>;
}

/// 基于ONNX Runtime的分类器
pub struct OnnxClassifier {
    model: ModelSelector,
    spec: ModelSpec,
    session: Arc<Mutex<Session>>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    labels: Vec<String>,
}

impl OnnxClassifier {
    pub fn new(config: &Config, model: ModelSelector) -> Result<Self> {
        let model_path = config.model_path(model);
        let labels_path = config.labels_path(model);

        if !model_path.exists() {
            return Err(ClassifyError::ModelLoad(format!(
                "{} model not found: {}",
                model,
                model_path.display()
            )));
        }

        tracing::info!("Loading {} model from: {}", model, model_path.display());

        let labels = load_labels(&labels_path)?;
        let session = build_session(config, &model_path)
            .map_err(|e| ClassifyError::ModelLoad(format!("{}: {}", model, e)))?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ClassifyError::ModelLoad(format!("{} model has no inputs", model)));
            }
        };

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(ClassifyError::ModelLoad(format!("{} model has no outputs", model)));
            }
        };

        tracing::info!(
            "{} model ready: input='{}', output='{}', labels={}",
            model,
            input_name,
            output_name,
            labels.len()
        );

        Ok(Self {
            model,
            spec: model.spec(),
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            labels,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// 调整到模型输入尺寸
    fn prepare_input(&self, image: &ProcessedImage) -> ProcessedImage {
        let size = self.spec.input_size;
        if image.dimensions() == (size, size) {
            return image.clone();
        }

        tracing::debug!(
            "{}: resizing input {}x{} -> {}x{}",
            self.model,
            image.width(),
            image.height(),
            size,
            size
        );
        ProcessedImage::new(imageops::resize(
            image.pixels(),
            size,
            size,
            FilterType::CatmullRom,
        ))
    }
}

impl Classifier for OnnxClassifier {
    fn model(&self) -> ModelSelector {
        self.model
    }

    fn classify(&self, image: &ProcessedImage) -> Result<ClassificationResult> {
        let input = self.prepare_input(image);
        let tensor = input.to_nchw(self.spec.mean, self.spec.std);

        let input_tensor = Tensor::from_array(tensor)
            .map_err(|e| ClassifyError::Inference(format!("failed to build input tensor: {}", e)))?;

        let scores: Vec<f32> = {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| ClassifyError::Inference(format!("{}: {}", self.model, e)))?;

            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.iter().copied().collect(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(ClassifyError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        if scores.is_empty() {
            return Err(ClassifyError::Inference(format!(
                "{} produced an empty output tensor",
                self.model
            )));
        }

        if scores.len() != self.labels.len() {
            tracing::warn!(
                "{}: output size ({}) != label count ({})",
                self.model,
                scores.len(),
                self.labels.len()
            );
        }

        Ok(scores_to_result(&scores, &self.labels))
    }
}

fn build_session(config: &Config, model_path: &Path) -> ort::Result<Session> {
    let level = if config.onnx_config.enable_optimization {
        match config.onnx_config.optimization_level {
            i32::MIN..=0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        }
    } else {
        GraphOptimizationLevel::Disable
    };

    Session::builder()?
        .with_optimization_level(level)?
        .with_intra_threads(config.onnx_config.intra_threads)?
        .commit_from_file(model_path)
}

/// 读取标签文件（每行一个，忽略空行）
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(ClassifyError::ModelLoad(format!(
            "Labels file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ClassifyError::ModelLoad(format!("Failed to read labels: {}", e)))?;

    let labels: Vec<String> = content.lines().filter_map(parse_label).collect();
    if labels.is_empty() {
        return Err(ClassifyError::ModelLoad(format!(
            "Labels file is empty: {}",
            path.display()
        )));
    }

    tracing::debug!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

/// 规范化标签行，兼容以下格式：
/// `tench`、`n01440764 tench, Tinca tinca`、`/a/abbey 0`
fn parse_label(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() > 1 && is_synset_id(tokens[0]) {
        tokens.remove(0);
    }
    if tokens.len() > 1 && tokens.last().is_some_and(|t| t.chars().all(|c| c.is_ascii_digit())) {
        tokens.pop();
    }

    let joined = tokens.join(" ");
    let name = if joined.starts_with('/') {
        joined.splitn(3, '/').nth(2).unwrap_or(&joined).to_string()
    } else {
        joined
    };

    let name = name.split(',').next().unwrap_or("").trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn is_synset_id(token: &str) -> bool {
    token.len() == 9 && token.starts_with('n') && token[1..].chars().all(|c| c.is_ascii_digit())
}

/// 模型输出已是概率分布时直接使用，否则做softmax
fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    let sum: f32 = scores.iter().sum();
    if in_range && (sum - 1.0).abs() < 1e-2 {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// 输出向量 -> 全部类别的有序结果，截断由调用方决定
fn scores_to_result(scores: &[f32], labels: &[String]) -> ClassificationResult {
    let probabilities = to_probabilities(scores);
    let entries = probabilities
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let label = labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", i));
            Classification::new(label, p)
        })
        .collect();

    ClassificationResult::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_label_formats() {
        assert_eq!(parse_label("tench").as_deref(), Some("tench"));
        assert_eq!(
            parse_label("n01440764 tench, Tinca tinca").as_deref(),
            Some("tench")
        );
        assert_eq!(parse_label("/a/abbey 0").as_deref(), Some("abbey"));
        assert_eq!(
            parse_label("/b/bakery/shop 27").as_deref(),
            Some("bakery/shop")
        );
        assert_eq!(parse_label("   "), None);
        assert_eq!(parse_label("great white shark").as_deref(), Some("great white shark"));
    }

    #[test]
    fn test_probabilities_pass_through() {
        let probs = to_probabilities(&[0.1, 0.7, 0.2]);
        assert_eq!(probs, vec![0.1, 0.7, 0.2]);
    }

    #[test]
    fn test_logits_get_softmax() {
        let probs = to_probabilities(&[2.0, 1.0, -3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_scores_to_result_keeps_every_class() {
        let result = scores_to_result(
            &[0.05, 0.6, 0.3, 0.05],
            &labels(&["a", "b", "c", "d"]),
        );
        assert_eq!(result.len(), 4);
        assert_eq!(result.top().unwrap().label, "b");
        assert_eq!(result.iter().nth(1).unwrap().label, "c");
    }

    #[test]
    fn test_scores_without_labels_get_indices() {
        let result = scores_to_result(&[0.2, 0.8], &labels(&["only"]));
        assert_eq!(result.top().unwrap().label, "class_1");
    }

    #[test]
    fn test_load_labels_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "n01440764 tench, Tinca tinca").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "n01443537 goldfish, Carassius auratus").unwrap();

        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["tench".to_string(), "goldfish".to_string()]);
    }

    #[test]
    fn test_missing_labels_is_model_load_error() {
        let err = load_labels(Path::new("/nonexistent/labels.txt")).unwrap_err();
        assert!(matches!(err, ClassifyError::ModelLoad(_)));
    }

    #[test]
    fn test_missing_model_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(
            "127.0.0.1:0".into(),
            dir.path().to_string_lossy().into_owned(),
            Some(1),
            false,
        )
        .unwrap();
        let err = match OnnxClassifier::new(&config, ModelSelector::SqueezeNet) {
            Err(e) => e,
            Ok(_) => panic!("expected missing model error"),
        };
        assert!(matches!(err, ClassifyError::ModelLoad(_)));
    }
}
