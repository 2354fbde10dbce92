use crate::{
    classify::{ClassifyOptions, ClassifyOutcome, ClassifyStats, ClassifyStatus, Fallback},
    image::{CropRect, ImageLoader, RawImage},
    models::{Classification, ModelSelector},
    utils::error::ClassifyError,
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct ClassifyJsonRequest {
    /// Base64编码的图像数据
    pub image: String,

    #[serde(flatten)]
    pub options: ClassifyOptions,
}

/// 分类响应
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub model: ModelSelector,
    /// "This might be a {label}\nconf:{confidence}"
    pub message: String,
    pub label: String,
    pub confidence: f32,
    pub predictions: Vec<Classification>,
    /// 送入分类器的图像尺寸
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
    pub stats: ClassifyStats,
    /// PNG base64（return_image=true 时返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,
}

impl ClassifyResponse {
    pub fn from_outcome(outcome: ClassifyOutcome, include_image: bool) -> Result<Self> {
        let processed_image = if include_image {
            Some(outcome.image.to_png_base64()?)
        } else {
            None
        };

        Ok(Self {
            model: outcome.model,
            message: outcome.payload.message(),
            label: outcome.payload.label,
            confidence: outcome.payload.confidence,
            width: outcome.image.width(),
            height: outcome.image.height(),
            predictions: outcome.predictions.into_vec(),
            fallback: outcome.fallback,
            stats: outcome.stats,
            processed_image,
        })
    }
}

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub timestamp: String,
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// JSON base64上传处理器
pub async fn classify_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ClassifyJsonRequest>,
) -> Result<Json<ApiResponse<ClassifyResponse>>> {
    tracing::info!(
        "Processing JSON classify request: request_id={}, model={:?}",
        request_id,
        request.options.model
    );

    let image = ImageLoader::from_base64(&request.image)?;
    let response = run_classification(&state, &request_id, image, request.options).await?;

    Ok(Json(ApiResponse::success(response, request_id)))
}

/// Multipart文件上传处理器
pub async fn classify_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ClassifyResponse>>> {
    tracing::info!("Processing multipart classify request: request_id={}", request_id);

    let mut image_data = None;
    let mut options = ClassifyOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ClassifyError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name == "file" {
            if let Some(content_type) = field.content_type() {
                if !content_type.starts_with("image/") {
                    return Err(ClassifyError::UnsupportedFormat(content_type.to_string()));
                }
            }

            let data = field.bytes().await.map_err(|e| {
                ClassifyError::InvalidInput(format!("Failed to read file data: {}", e))
            })?;
            if data.is_empty() {
                return Err(ClassifyError::InvalidInput("Empty file".to_string()));
            }

            tracing::debug!("Received file: {} bytes", data.len());
            image_data = Some(data);
            continue;
        }

        let value = field.text().await.map_err(|e| {
            ClassifyError::InvalidInput(format!("Failed to read field '{}': {}", field_name, e))
        })?;
        apply_form_field(&mut options, &field_name, value.trim())?;
    }

    let image_data =
        image_data.ok_or_else(|| ClassifyError::InvalidInput("No image file provided".to_string()))?;
    let image = ImageLoader::from_bytes(&image_data)?;

    let response = run_classification(&state, &request_id, image, options).await?;
    Ok(Json(ApiResponse::success(response, request_id)))
}

/// 解析表单字段到选项
fn apply_form_field(options: &mut ClassifyOptions, name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }

    let invalid = |what: &str| ClassifyError::InvalidInput(format!("Invalid {}: '{}'", what, value));

    match name {
        "model" => options.model = Some(value.parse()?),
        "preprocess" => options.preprocess = Some(value.parse().map_err(|_| invalid("preprocess"))?),
        "crop" => options.crop = Some(parse_crop(value).ok_or_else(|| invalid("crop"))?),
        "scale" => options.scale = Some(value.parse().map_err(|_| invalid("scale"))?),
        "contrast" => options.contrast = Some(value.parse().map_err(|_| invalid("contrast"))?),
        "top_k" => options.top_k = Some(value.parse().map_err(|_| invalid("top_k"))?),
        "return_image" => {
            options.return_image = value.parse().map_err(|_| invalid("return_image"))?
        }
        _ => tracing::debug!("Ignoring unknown field: {}", name),
    }
    Ok(())
}

/// "x,y,width,height"
fn parse_crop(value: &str) -> Option<CropRect> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [x, y, width, height] => Some(CropRect::new(*x, *y, *width, *height)),
        _ => None,
    }
}

async fn run_classification(
    state: &AppState,
    request_id: &str,
    image: RawImage,
    options: ClassifyOptions,
) -> Result<ClassifyResponse> {
    let start_time = Instant::now();
    let include_image = options.return_image;

    // 限制同时进行的分类任务数；许可证交给阻塞任务持有
    let permit = Arc::clone(&state.jobs)
        .acquire_owned()
        .await
        .map_err(|e| ClassifyError::Internal(format!("Job limiter closed: {}", e)))?;

    // 开发模式下输出进度
    let status_tx = if state.config.dev_mode {
        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<ClassifyStatus>();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                tracing::debug!(
                    "Classify progress [{}]: {:?} - {:.1}% - {}",
                    request_id,
                    status.stage,
                    status.progress * 100.0,
                    status.message
                );
            }
        });
        Some(status_tx)
    } else {
        None
    };

    let outcome = state
        .pipeline
        .classify_with_permit(image, options, status_tx, permit)
        .await?;

    tracing::info!(
        "Classify completed: request_id={}, model={}, label={}, time={:.3}s",
        request_id,
        outcome.model,
        outcome.payload.label,
        start_time.elapsed().as_secs_f32()
    );

    ClassifyResponse::from_outcome(outcome, include_image)
}
