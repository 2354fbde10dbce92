use crate::{
    classify::{ClassifyOptions, ClassifyOutcome, ClassifyStage, ClassifyStats, ClassifyStatus, Fallback},
    image::{ImagePreprocessor, ProcessedImage, ProcessingConfig, RawImage, ResultFormatter},
    models::{ModelManager, ModelSelector},
    utils::error::ClassifyError,
    Result,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

type StatusSender = mpsc::UnboundedSender<ClassifyStatus>;

fn report(status_tx: Option<&StatusSender>, stage: ClassifyStage, progress: f32, message: &str) {
    if let Some(tx) = status_tx {
        let _ = tx.send(ClassifyStatus::new(stage, progress, message));
    }
}

/// 分类流程：预处理 -> 推理 -> 格式化
///
/// 回退策略：
/// - 预处理失败（裁剪越界、缩放系数非法、重采样失败）时记录警告，改用未处理的原图分类；
/// - 处理后的图推理失败时，用原图重试一次；
/// - 模型加载失败与空结果直接返回错误。
#[derive(Clone)]
pub struct ClassificationPipeline {
    manager: Arc<ModelManager>,
}

impl ClassificationPipeline {
    pub fn new(manager: Arc<ModelManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    /// 在阻塞线程池中执行，避免占用异步运行时
    pub async fn classify(
        &self,
        image: RawImage,
        options: ClassifyOptions,
        status_tx: Option<StatusSender>,
    ) -> Result<ClassifyOutcome> {
        self.spawn_classify(image, options, status_tx, None).await
    }

    /// 同 classify，许可证随任务进入阻塞线程，任务结束才释放。
    /// 调用方的future被取消（如请求超时）时，许可证仍然占用到推理真正完成。
    pub async fn classify_with_permit(
        &self,
        image: RawImage,
        options: ClassifyOptions,
        status_tx: Option<StatusSender>,
        permit: OwnedSemaphorePermit,
    ) -> Result<ClassifyOutcome> {
        self.spawn_classify(image, options, status_tx, Some(permit)).await
    }

    async fn spawn_classify(
        &self,
        image: RawImage,
        options: ClassifyOptions,
        status_tx: Option<StatusSender>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<ClassifyOutcome> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = pipeline.classify_with_options(&image, &options, status_tx.as_ref());
            drop(permit);
            outcome
        })
        .await
        .map_err(|e| ClassifyError::Internal(format!("Classification task failed: {}", e)))?
    }

    /// 按请求选项解析模型与预处理参数后执行
    pub fn classify_with_options(
        &self,
        image: &RawImage,
        options: &ClassifyOptions,
        status_tx: Option<&StatusSender>,
    ) -> Result<ClassifyOutcome> {
        let config = self.manager.config();
        let model = options.model.unwrap_or(config.default_model);
        let processing = options.processing_config(image, &config.processing);

        let top_k = options.top_k.unwrap_or(config.processing.top_k).max(1);

        let mut outcome = self.run(image, model, processing.as_ref(), status_tx)?;
        outcome.predictions.truncate(top_k);
        Ok(outcome)
    }

    /// 核心流程；processing 为 None 时跳过预处理
    pub fn run(
        &self,
        image: &RawImage,
        model: ModelSelector,
        processing: Option<&ProcessingConfig>,
        status_tx: Option<&StatusSender>,
    ) -> Result<ClassifyOutcome> {
        let start_time = Instant::now();

        // 模型不可用时直接报错，由用户切换模型
        let classifier = self.manager.classifier(model)?;

        report(status_tx, ClassifyStage::Preprocessing, 0.1, "Preprocessing image");

        let (processed, mut fallback) = match processing {
            Some(config) => match ImagePreprocessor::preprocess(image, config) {
                Ok(processed) => (processed, None),
                Err(e) if e.is_preprocessing() => {
                    tracing::warn!("Preprocessing failed, classifying original image: {}", e);
                    (
                        image.to_unprocessed(),
                        Some(Fallback::PreprocessingFailed(e.to_string())),
                    )
                }
                Err(e) => return Err(e),
            },
            None => (image.to_unprocessed(), None),
        };
        let preprocessing_time = start_time.elapsed();
        let preprocessed = processing.is_some() && fallback.is_none();

        report(
            status_tx,
            ClassifyStage::Classification,
            0.4,
            &format!("Classifying with {}", model),
        );

        let classification_start = Instant::now();
        let (image_used, predictions) = match classifier.classify(&processed) {
            Ok(predictions) => (processed, predictions),
            Err(e) if preprocessed && e.is_retryable_inference() => {
                tracing::warn!("Inference on processed image failed, retrying with original: {}", e);
                let original: ProcessedImage = image.to_unprocessed();
                let predictions = classifier.classify(&original)?;
                fallback = Some(Fallback::InferenceRetried(e.to_string()));
                (original, predictions)
            }
            Err(e) => return Err(e),
        };
        let classification_time = classification_start.elapsed();

        let payload = ResultFormatter::display_payload(&predictions, model)?;
        ResultFormatter::log_predictions(
            &predictions,
            model,
            self.manager.config().processing.log_threshold,
        );

        let total_time = start_time.elapsed();

        report(
            status_tx,
            ClassifyStage::Completed,
            1.0,
            &format!("Classification completed: {}", payload.label),
        );

        tracing::info!(
            "Classification completed: model={}, label={}, confidence={:.4}, fallback={}, total_time={:.3}s",
            model,
            payload.label,
            payload.confidence,
            fallback.is_some(),
            total_time.as_secs_f32()
        );

        Ok(ClassifyOutcome {
            model,
            payload,
            predictions,
            image: image_used,
            fallback,
            stats: ClassifyStats {
                preprocessing_time_ms: preprocessing_time.as_millis() as u64,
                classification_time_ms: classification_time.as_millis() as u64,
                total_time_ms: total_time.as_millis() as u64,
            },
        })
    }
}
