use crate::image::geometry::{CropRect, CropRegion};
use crate::image::transforms::ImageTransforms;
use crate::image::types::{ProcessedImage, RawImage};
use crate::utils::error::ClassifyError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// 预处理参数，每次调用单独传入
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// 裁剪区域（默认整张图）
    #[serde(default)]
    pub crop: CropRegion,

    /// 缩放比例，必须为正
    #[serde(default = "default_factor")]
    pub scale: f64,

    /// 对比度系数，1.0 表示不变
    #[serde(default = "default_factor")]
    pub contrast: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self::identity()
    }
}

impl ProcessingConfig {
    /// 不做任何变换的配置
    pub fn identity() -> Self {
        Self {
            crop: CropRegion::WholeImage,
            scale: 1.0,
            contrast: 1.0,
        }
    }

    pub fn new(crop: CropRegion, scale: f64, contrast: f64) -> Self {
        Self { crop, scale, contrast }
    }

    /// 居中最大正方形裁剪，并缩放到 target x target
    ///
    /// 这是调用方的便捷构造，管线本身不会自动计算裁剪和缩放。
    pub fn center_square(width: u32, height: u32, target: u32, contrast: f64) -> Self {
        let rect = CropRect::center_square(width, height);
        let scale = if rect.width == 0 {
            1.0
        } else {
            target as f64 / rect.width as f64
        };
        Self {
            crop: CropRegion::Rect(rect),
            scale,
            contrast,
        }
    }

    /// 参数检查（不依赖图像尺寸的部分）
    pub fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ClassifyError::InvalidScaleFactor(self.scale));
        }
        if !(self.contrast.is_finite() && self.contrast > 0.0) {
            return Err(ClassifyError::InvalidContrast(self.contrast));
        }
        Ok(())
    }
}

/// 分类前的图像预处理
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 预处理流水线：摆正 -> 裁剪 -> 缩放 -> 对比度
    ///
    /// 纯函数：不修改输入，不保留跨调用状态。失败时调用方可退回到原图分类。
    pub fn preprocess(image: &RawImage, config: &ProcessingConfig) -> Result<ProcessedImage> {
        config.validate()?;

        let upright = image.upright();
        let (width, height) = upright.dimensions();

        // 1. 裁剪
        let rect = config.crop.resolve(width, height)?;
        let cropped = if config.crop.is_whole_image() {
            upright
        } else {
            ImageTransforms::crop(&upright, &rect)?
        };

        // 2. 缩放
        let scaled = if config.scale == 1.0 {
            cropped
        } else {
            ImageTransforms::scale(&cropped, config.scale)?
        };

        // 3. 对比度
        let adjusted = if config.contrast == 1.0 {
            scaled
        } else {
            ImageTransforms::adjust_contrast(&scaled, config.contrast)?
        };

        tracing::debug!(
            "Preprocessed {}x{} -> {}x{} (crop={:?}, scale={}, contrast={})",
            width,
            height,
            adjusted.width(),
            adjusted.height(),
            config.crop,
            config.scale,
            config.contrast
        );

        Ok(ProcessedImage::new(adjusted))
    }
}
