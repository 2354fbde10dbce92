use crate::utils::error::ClassifyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 可选的分类模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelSelector {
    /// 场景分类（Places365）
    #[default]
    #[serde(rename = "googlenet-places")]
    GoogLeNetPlaces,
    /// 轻量ImageNet分类
    #[serde(rename = "squeezenet")]
    SqueezeNet,
    /// ImageNet分类
    #[serde(rename = "resnet50")]
    ResNet50,
}

/// 模型的输入约定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    /// models_dir 下的子目录
    pub dir_name: &'static str,
    /// 方形输入边长
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl ModelSelector {
    pub const ALL: [ModelSelector; 3] = [
        ModelSelector::GoogLeNetPlaces,
        ModelSelector::SqueezeNet,
        ModelSelector::ResNet50,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSelector::GoogLeNetPlaces => "googlenet-places",
            ModelSelector::SqueezeNet => "squeezenet",
            ModelSelector::ResNet50 => "resnet50",
        }
    }

    /// 分段控件的索引（0/1/2）
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            ModelSelector::GoogLeNetPlaces => 0,
            ModelSelector::SqueezeNet => 1,
            ModelSelector::ResNet50 => 2,
        }
    }

    pub fn spec(&self) -> ModelSpec {
        match self {
            // Caffe风格：只减均值，输入保持0-255
            ModelSelector::GoogLeNetPlaces => ModelSpec {
                dir_name: "googlenet_places",
                input_size: 224,
                mean: IMAGENET_MEAN,
                std: [1.0 / 255.0; 3],
            },
            ModelSelector::SqueezeNet => ModelSpec {
                dir_name: "squeezenet",
                input_size: 224,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
            ModelSelector::ResNet50 => ModelSpec {
                dir_name: "resnet50",
                input_size: 224,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
        }
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSelector {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "googlenet-places" | "googlenetplaces" | "googlenet" | "places" | "0" => {
                Ok(ModelSelector::GoogLeNetPlaces)
            }
            "squeezenet" | "1" => Ok(ModelSelector::SqueezeNet),
            "resnet50" | "resnet-50" | "resnet" | "2" => Ok(ModelSelector::ResNet50),
            _ => Err(ClassifyError::InvalidInput(format!(
                "Unknown model '{}'. Supported models: googlenet-places, squeezenet, resnet50",
                s
            ))),
        }
    }
}
