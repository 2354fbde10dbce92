use crate::config::ProcessingDefaults;
use crate::image::{CropRect, CropRegion, DisplayPayload, ProcessedImage, ProcessingConfig, RawImage};
use crate::models::{ClassificationResult, ModelSelector};
use serde::{Deserialize, Serialize};

/// 单次分类请求的选项
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyOptions {
    /// 使用的模型（默认取配置）
    #[serde(default)]
    pub model: Option<ModelSelector>,

    /// 是否预处理（默认取配置）
    #[serde(default)]
    pub preprocess: Option<bool>,

    /// 裁剪矩形
    #[serde(default)]
    pub crop: Option<CropRect>,

    /// 缩放比例
    #[serde(default)]
    pub scale: Option<f64>,

    /// 对比度系数
    #[serde(default)]
    pub contrast: Option<f64>,

    /// 返回的候选数量，未指定时取配置默认值
    #[serde(default)]
    pub top_k: Option<usize>,

    /// 是否返回处理后的图像
    #[serde(default)]
    pub return_image: bool,
}

impl ClassifyOptions {
    pub fn has_explicit_processing(&self) -> bool {
        self.crop.is_some() || self.scale.is_some() || self.contrast.is_some()
    }

    /// 解析出本次请求的预处理参数，None 表示跳过预处理
    ///
    /// 显式参数优先；否则按默认值居中裁剪并缩放到 target_size。
    pub fn processing_config(
        &self,
        image: &RawImage,
        defaults: &ProcessingDefaults,
    ) -> Option<ProcessingConfig> {
        if self.preprocess == Some(false) {
            return None;
        }

        if self.has_explicit_processing() {
            return Some(ProcessingConfig {
                crop: self.crop.map(CropRegion::Rect).unwrap_or_default(),
                scale: self.scale.unwrap_or(1.0),
                contrast: self.contrast.unwrap_or(defaults.contrast),
            });
        }

        if self.preprocess.unwrap_or(defaults.preprocess) {
            let (width, height) = image.upright_dimensions();
            Some(ProcessingConfig::center_square(
                width,
                height,
                defaults.target_size,
                defaults.contrast,
            ))
        } else {
            None
        }
    }
}

/// 分类处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ClassifyStage {
    Preprocessing,
    Classification,
    Completed,
}

/// 分类处理状态（进度上报）
#[derive(Debug, Clone)]
pub struct ClassifyStatus {
    /// 当前处理阶段
    pub stage: ClassifyStage,
    /// 进度百分比 (0.0 - 1.0)
    pub progress: f32,
    /// 状态消息
    pub message: String,
}

impl ClassifyStatus {
    pub fn new(stage: ClassifyStage, progress: f32, message: &str) -> Self {
        Self {
            stage,
            progress,
            message: message.to_string(),
        }
    }
}

/// 走了退路的原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Fallback {
    /// 预处理失败，直接对原图分类
    PreprocessingFailed(String),
    /// 处理后的图推理失败，用原图重试成功
    InferenceRetried(String),
}

/// 分类处理统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifyStats {
    pub preprocessing_time_ms: u64,
    pub classification_time_ms: u64,
    pub total_time_ms: u64,
}

/// 一次分类的完整结果
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub model: ModelSelector,
    pub payload: DisplayPayload,
    pub predictions: ClassificationResult,
    /// 实际送入分类器的图像
    pub image: ProcessedImage,
    pub fallback: Option<Fallback>,
    pub stats: ClassifyStats,
}

impl ClassifyOutcome {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn raw(width: u32, height: u32) -> RawImage {
        RawImage::new(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))).unwrap()
    }

    #[test]
    fn test_default_options_center_square() {
        let config = ClassifyOptions::default()
            .processing_config(&raw(448, 300), &ProcessingDefaults::default())
            .unwrap();
        assert_eq!(config.crop, CropRegion::Rect(CropRect::new(74, 0, 300, 300)));
        assert!((300.0 * config.scale - 224.0).abs() < 1e-9);
    }

    #[test]
    fn test_preprocess_disabled() {
        let options = ClassifyOptions {
            preprocess: Some(false),
            scale: Some(2.0),
            ..Default::default()
        };
        assert!(options
            .processing_config(&raw(10, 10), &ProcessingDefaults::default())
            .is_none());

        let defaults = ProcessingDefaults {
            preprocess: false,
            ..Default::default()
        };
        assert!(ClassifyOptions::default()
            .processing_config(&raw(10, 10), &defaults)
            .is_none());
    }

    #[test]
    fn test_explicit_values_win() {
        let options = ClassifyOptions {
            crop: Some(CropRect::new(1, 2, 3, 4)),
            scale: Some(0.0),
            ..Default::default()
        };
        let config = options
            .processing_config(&raw(10, 10), &ProcessingDefaults::default())
            .unwrap();
        assert_eq!(config.crop, CropRegion::Rect(CropRect::new(1, 2, 3, 4)));
        assert_eq!(config.scale, 0.0);
        assert_eq!(config.contrast, 1.0);
    }

    #[test]
    fn test_options_deserialize() {
        let options: ClassifyOptions =
            serde_json::from_str(r#"{"model": "squeezenet", "scale": 0.5, "return_image": true}"#)
                .unwrap();
        assert_eq!(options.model, Some(ModelSelector::SqueezeNet));
        assert_eq!(options.scale, Some(0.5));
        assert!(options.return_image);
    }
}
