use crate::utils::error::ClassifyError;
use crate::Result;
use base64::Engine;
use image::metadata::Orientation;
use image::{DynamicImage, ImageFormat, RgbaImage};
use ndarray::Array4;
use std::io::Cursor;

/// 拍摄得到的原始图像（RGBA8 + 方向信息），管线只读不写
#[derive(Debug, Clone)]
pub struct RawImage {
    pixels: RgbaImage,
    orientation: Orientation,
}

impl RawImage {
    pub fn new(pixels: RgbaImage) -> Result<Self> {
        Self::with_orientation(pixels, Orientation::NoTransforms)
    }

    pub fn with_orientation(pixels: RgbaImage, orientation: Orientation) -> Result<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifyError::InvalidInput(format!(
                "Image must have positive dimensions, got {}x{}",
                width, height
            )));
        }
        Ok(Self { pixels, orientation })
    }

    pub fn from_dynamic(image: DynamicImage, orientation: Orientation) -> Result<Self> {
        Self::with_orientation(image.into_rgba8(), orientation)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// 按方向信息摆正后的像素（新缓冲区）
    pub fn upright(&self) -> RgbaImage {
        if self.orientation == Orientation::NoTransforms {
            return self.pixels.clone();
        }
        let mut image = DynamicImage::ImageRgba8(self.pixels.clone());
        image.apply_orientation(self.orientation);
        image.into_rgba8()
    }

    /// 摆正后的尺寸
    pub fn upright_dimensions(&self) -> (u32, u32) {
        match self.orientation {
            Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH => (self.height(), self.width()),
            _ => (self.width(), self.height()),
        }
    }

    /// 不经预处理直接送入分类器的图像
    pub fn to_unprocessed(&self) -> ProcessedImage {
        ProcessedImage::new(self.upright())
    }
}

/// 预处理输出，所有权交给调用方
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pixels: RgbaImage,
}

impl ProcessedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// 转换为NCHW张量: (pixel / 255 - mean) / std，忽略alpha
    pub fn to_nchw(&self, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
        let (width, height) = self.pixels.dimensions();
        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            let value = self.pixels.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / std[c]
        })
    }

    /// 编码为PNG字节
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.pixels.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    /// 编码为PNG的base64字符串（用于前端展示）
    pub fn to_png_base64(&self) -> Result<String> {
        let bytes = self.to_png_bytes()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}
