use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// 分类失败时展示给用户的提示
pub const DISPLAY_ERROR_MESSAGE: &str = "Error, could not classify";

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Crop rectangle {x},{y} {width}x{height} is outside the {image_width}x{image_height} image")]
    InvalidCropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Scale factor must be positive and finite, got {0}")]
    InvalidScaleFactor(f64),

    #[error("Contrast must be positive and finite, got {0}")]
    InvalidContrast(f64),

    #[error("Resampling failed: {0}")]
    ResamplingFailure(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Classifier returned no results for model {0}")]
    EmptyResult(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ClassifyError {
    /// 预处理阶段的错误，调用方可以退回到未处理的原图
    pub fn is_preprocessing(&self) -> bool {
        matches!(
            self,
            ClassifyError::InvalidCropBounds { .. }
                | ClassifyError::InvalidScaleFactor(_)
                | ClassifyError::InvalidContrast(_)
                | ClassifyError::ResamplingFailure(_)
        )
    }

    /// 推理阶段的错误，允许用原图重试一次
    pub fn is_retryable_inference(&self) -> bool {
        matches!(self, ClassifyError::Inference(_) | ClassifyError::Ort(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifyError::InvalidCropBounds { .. }
            | ClassifyError::InvalidScaleFactor(_)
            | ClassifyError::InvalidContrast(_)
            | ClassifyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClassifyError::ResamplingFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClassifyError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ClassifyError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ClassifyError::Base64(_) => StatusCode::BAD_REQUEST,
            ClassifyError::Json(_) => StatusCode::BAD_REQUEST,
            ClassifyError::ImageDecode(_) => StatusCode::BAD_REQUEST,
            ClassifyError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            ClassifyError::EmptyResult(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ClassifyError::InvalidCropBounds { .. } => "INVALID_CROP_BOUNDS",
            ClassifyError::InvalidScaleFactor(_) => "INVALID_SCALE_FACTOR",
            ClassifyError::InvalidContrast(_) => "INVALID_CONTRAST",
            ClassifyError::ResamplingFailure(_) => "RESAMPLING_FAILURE",
            ClassifyError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ClassifyError::Inference(_) => "INFERENCE_ERROR",
            ClassifyError::EmptyResult(_) => "EMPTY_RESULT",
            ClassifyError::InvalidInput(_) => "INVALID_INPUT",
            ClassifyError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            ClassifyError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ClassifyError::Config(_) => "CONFIG_ERROR",
            ClassifyError::Io(_) => "IO_ERROR",
            ClassifyError::Json(_) => "JSON_ERROR",
            ClassifyError::Base64(_) => "BASE64_DECODE_ERROR",
            ClassifyError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            ClassifyError::Ort(_) => "ORT_ERROR",
            ClassifyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "success": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "display": DISPLAY_ERROR_MESSAGE,
            }
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocessing_errors_are_recoverable() {
        assert!(ClassifyError::InvalidScaleFactor(0.0).is_preprocessing());
        assert!(ClassifyError::ResamplingFailure("zero area".into()).is_preprocessing());
        assert!(!ClassifyError::ModelLoad("missing".into()).is_preprocessing());
        assert!(!ClassifyError::EmptyResult("resnet50".into()).is_preprocessing());
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            ClassifyError::InvalidCropBounds {
                x: 300,
                y: 300,
                width: 10,
                height: 10,
                image_width: 224,
                image_height: 224,
            },
            ClassifyError::InvalidScaleFactor(-1.0),
            ClassifyError::ResamplingFailure("x".into()),
            ClassifyError::ModelLoad("x".into()),
            ClassifyError::Inference("x".into()),
            ClassifyError::EmptyResult("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.error_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ClassifyError::ModelLoad("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ClassifyError::InvalidScaleFactor(0.0).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
