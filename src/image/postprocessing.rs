use crate::models::{ClassificationResult, ModelSelector};
use crate::utils::error::ClassifyError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// 展示给用户的结果（只含最高置信度的一项）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub label: String,
    pub confidence: f32,
}

impl DisplayPayload {
    /// "This might be a {label}\nconf:{confidence}"
    pub fn message(&self) -> String {
        format!("This might be a {}\nconf:{}", self.label, self.confidence)
    }
}

impl std::fmt::Display for DisplayPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// 结果格式化器
pub struct ResultFormatter;

impl ResultFormatter {
    /// 取最高置信度结果；结果为空时返回 EmptyResult 而不是崩溃
    pub fn display_payload(
        result: &ClassificationResult,
        model: ModelSelector,
    ) -> Result<DisplayPayload> {
        let top = result
            .top()
            .ok_or_else(|| ClassifyError::EmptyResult(model.to_string()))?;

        Ok(DisplayPayload {
            label: top.label.clone(),
            confidence: top.confidence,
        })
    }

    /// 记录超过阈值的候选项
    pub fn log_predictions(result: &ClassificationResult, model: ModelSelector, threshold: f32) {
        for prediction in result.above(threshold) {
            tracing::debug!(
                "[{}] {} {:.4}",
                model,
                prediction.label,
                prediction.confidence
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classification;

    #[test]
    fn test_message_format() {
        let payload = DisplayPayload {
            label: "red-square".to_string(),
            confidence: 0.97,
        };
        assert_eq!(payload.message(), "This might be a red-square\nconf:0.97");
        assert_eq!(payload.to_string(), payload.message());
    }

    #[test]
    fn test_display_payload_picks_top() {
        let result = ClassificationResult::new(vec![
            Classification::new("library", 0.12),
            Classification::new("bakery", 0.81),
        ]);
        let payload = ResultFormatter::display_payload(&result, ModelSelector::GoogLeNetPlaces).unwrap();
        assert_eq!(payload.label, "bakery");
        assert_eq!(payload.confidence, 0.81);
    }

    #[test]
    fn test_empty_result_is_error() {
        let result = ClassificationResult::default();
        let err = ResultFormatter::display_payload(&result, ModelSelector::SqueezeNet).unwrap_err();
        assert!(matches!(err, ClassifyError::EmptyResult(_)));
    }
}
