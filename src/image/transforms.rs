use crate::image::geometry::{scaled_dimensions, CropRect};
use crate::image::loader::MAX_IMAGE_EDGE;
use crate::utils::error::ClassifyError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// 缩放后允许的最大边长，与加载上限一致
pub const MAX_SCALED_EDGE: u64 = MAX_IMAGE_EDGE as u64;

/// 对比度调整的中灰点
pub const MID_GRAY: f64 = 128.0;

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 裁剪矩形区域（矩形需已通过边界检查）
    pub fn crop(image: &RgbaImage, rect: &CropRect) -> Result<RgbaImage> {
        rect.validate_within(image.width(), image.height())?;

        if rect.x == 0
            && rect.y == 0
            && rect.width == image.width()
            && rect.height == image.height()
        {
            return Ok(image.clone());
        }

        Ok(imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
    }

    /// 按比例缩放（Lanczos3）
    pub fn scale(image: &RgbaImage, scale: f64) -> Result<RgbaImage> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ClassifyError::InvalidScaleFactor(scale));
        }

        let (orig_w, orig_h) = image.dimensions();
        let (new_w, new_h) = scaled_dimensions(orig_w, orig_h, scale);

        if new_w == 0 || new_h == 0 {
            return Err(ClassifyError::ResamplingFailure(format!(
                "scaling {}x{} by {} yields an empty image",
                orig_w, orig_h, scale
            )));
        }
        if new_w > MAX_SCALED_EDGE || new_h > MAX_SCALED_EDGE {
            return Err(ClassifyError::ResamplingFailure(format!(
                "scaling {}x{} by {} yields {}x{}, maximum edge is {}",
                orig_w, orig_h, scale, new_w, new_h, MAX_SCALED_EDGE
            )));
        }

        let (new_w, new_h) = (new_w as u32, new_h as u32);
        if (new_w, new_h) == (orig_w, orig_h) {
            return Ok(image.clone());
        }

        tracing::debug!(
            "Resampling {}x{} -> {}x{} (scale={})",
            orig_w, orig_h, new_w, new_h, scale
        );

        Ok(imageops::resize(image, new_w, new_h, FilterType::Lanczos3))
    }

    /// 对比度调整：以中灰为中心线性拉伸RGB，alpha不变
    pub fn adjust_contrast(image: &RgbaImage, contrast: f64) -> Result<RgbaImage> {
        if !(contrast.is_finite() && contrast > 0.0) {
            return Err(ClassifyError::InvalidContrast(contrast));
        }

        let mut adjusted = image.clone();
        if contrast == 1.0 {
            return Ok(adjusted);
        }

        for pixel in adjusted.pixels_mut() {
            for channel in pixel.0.iter_mut().take(3) {
                let value = (*channel as f64 - MID_GRAY) * contrast + MID_GRAY;
                *channel = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        Ok(adjusted)
    }
}
