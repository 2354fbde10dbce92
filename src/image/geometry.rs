use crate::utils::error::ClassifyError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// 裁剪矩形（像素坐标，原点在左上角）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// 检查矩形是否完全落在图像内
    pub fn validate_within(&self, image_width: u32, image_height: u32) -> Result<()> {
        let out_of_bounds = || ClassifyError::InvalidCropBounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            image_width,
            image_height,
        };

        // checked_add防止u32溢出绕回
        let right = self.x.checked_add(self.width).ok_or_else(out_of_bounds)?;
        let bottom = self.y.checked_add(self.height).ok_or_else(out_of_bounds)?;

        if right > image_width || bottom > image_height {
            return Err(out_of_bounds());
        }

        if self.area() == 0 {
            return Err(ClassifyError::ResamplingFailure(format!(
                "zero-area crop {}x{} at ({}, {})",
                self.width, self.height, self.x, self.y
            )));
        }

        Ok(())
    }

    /// 以图像中心为基准的最大正方形
    pub fn center_square(image_width: u32, image_height: u32) -> Self {
        let side = image_width.min(image_height);
        Self {
            x: (image_width - side) / 2,
            y: (image_height - side) / 2,
            width: side,
            height: side,
        }
    }
}

/// 裁剪区域：整张图或指定矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropRegion {
    #[default]
    WholeImage,
    Rect(CropRect),
}

impl CropRegion {
    pub fn is_whole_image(&self) -> bool {
        matches!(self, CropRegion::WholeImage)
    }

    /// 解析为具体矩形，并做边界检查
    pub fn resolve(&self, image_width: u32, image_height: u32) -> Result<CropRect> {
        match self {
            CropRegion::WholeImage => Ok(CropRect::new(0, 0, image_width, image_height)),
            CropRegion::Rect(rect) => {
                rect.validate_within(image_width, image_height)?;
                Ok(*rect)
            }
        }
    }
}

impl From<CropRect> for CropRegion {
    fn from(rect: CropRect) -> Self {
        CropRegion::Rect(rect)
    }
}

/// 缩放后的尺寸：round(w * s) x round(h * s)
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u64, u64) {
    let w = (width as f64 * scale).round();
    let h = (height as f64 * scale).round();
    (w.max(0.0) as u64, h.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_out_of_bounds_origin() {
        let rect = CropRect::new(300, 300, 10, 10);
        let err = rect.validate_within(224, 224).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidCropBounds { .. }));
    }

    #[test]
    fn test_crop_extent_past_edge() {
        let rect = CropRect::new(200, 0, 25, 224);
        assert!(matches!(
            rect.validate_within(224, 224),
            Err(ClassifyError::InvalidCropBounds { .. })
        ));

        let rect = CropRect::new(199, 0, 25, 224);
        assert!(rect.validate_within(224, 224).is_ok());
    }

    #[test]
    fn test_crop_overflow_is_out_of_bounds() {
        let rect = CropRect::new(u32::MAX, 0, 2, 2);
        assert!(matches!(
            rect.validate_within(224, 224),
            Err(ClassifyError::InvalidCropBounds { .. })
        ));
    }

    #[test]
    fn test_zero_area_crop_is_resampling_failure() {
        let rect = CropRect::new(10, 10, 0, 50);
        assert!(matches!(
            rect.validate_within(224, 224),
            Err(ClassifyError::ResamplingFailure(_))
        ));
    }

    #[test]
    fn test_zero_area_crop_on_far_edge_is_resampling_failure() {
        for rect in [CropRect::new(224, 0, 0, 10), CropRect::new(0, 224, 10, 0)] {
            assert!(matches!(
                rect.validate_within(224, 224),
                Err(ClassifyError::ResamplingFailure(_))
            ));
        }
        assert!(matches!(
            CropRect::new(225, 0, 0, 10).validate_within(224, 224),
            Err(ClassifyError::InvalidCropBounds { .. })
        ));
    }

    #[test]
    fn test_whole_image_resolves_to_full_rect() {
        let rect = CropRegion::WholeImage.resolve(640, 480).unwrap();
        assert_eq!(rect, CropRect::new(0, 0, 640, 480));
    }

    #[test]
    fn test_center_square() {
        assert_eq!(CropRect::center_square(640, 480), CropRect::new(80, 0, 480, 480));
        assert_eq!(CropRect::center_square(300, 500), CropRect::new(0, 100, 300, 300));
    }

    #[test]
    fn test_scaled_dimensions_rounding() {
        assert_eq!(scaled_dimensions(100, 50, 1.0), (100, 50));
        assert_eq!(scaled_dimensions(3, 3, 0.5), (2, 2));
        assert_eq!(scaled_dimensions(2688, 2688, 224.0 / 2688.0), (224, 224));
        assert_eq!(scaled_dimensions(1, 1, 0.1), (0, 0));
    }
}
