use crate::image::RawImage;
use crate::utils::error::ClassifyError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// 上传图像的大小上限
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// 解码后允许的最大边长
pub const MAX_IMAGE_EDGE: u32 = 8192;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str) -> Result<RawImage> {
        // 移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = if base64_data.starts_with("data:") {
            base64_data.split(',').nth(1).unwrap_or(base64_data)
        } else {
            base64_data
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;

        Self::from_bytes(&image_bytes)
    }

    /// 从字节加载图像，同时读取EXIF方向
    pub fn from_bytes(bytes: &[u8]) -> Result<RawImage> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ClassifyError::FileTooLarge(bytes.len(), MAX_IMAGE_BYTES));
        }
        if bytes.is_empty() {
            return Err(ClassifyError::InvalidInput("Empty image data".to_string()));
        }

        let format = Self::detect_format(bytes).ok_or_else(|| {
            ClassifyError::UnsupportedFormat("unrecognized image data".to_string())
        })?;
        if !Self::is_supported_format(format) {
            return Err(ClassifyError::UnsupportedFormat(format!("{:?}", format)));
        }

        let mut decoder = ImageReader::with_format(Cursor::new(bytes), format).into_decoder()?;
        let orientation = decoder.orientation()?;
        let image = DynamicImage::from_decoder(decoder)?;

        Self::validate_dimensions(&image)?;

        tracing::debug!(
            "Decoded {:?} image {}x{} (orientation={:?})",
            format,
            image.width(),
            image.height(),
            orientation
        );

        RawImage::from_dynamic(image, orientation)
    }

    /// 从文件路径加载图像
    pub fn from_path(path: impl AsRef<Path>) -> Result<RawImage> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = (image.width(), image.height());

        if width == 0 || height == 0 {
            return Err(ClassifyError::InvalidInput(format!(
                "Image has no pixels: {}x{}",
                width, height
            )));
        }

        if width > MAX_IMAGE_EDGE || height > MAX_IMAGE_EDGE {
            return Err(ClassifyError::InvalidInput(format!(
                "Image too large: {}x{}, maximum {}x{}",
                width, height, MAX_IMAGE_EDGE, MAX_IMAGE_EDGE
            )));
        }

        Ok(())
    }
}
