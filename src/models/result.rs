use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 单个分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// 标签
    pub label: String,
    /// 置信度 (0.0 - 1.0)
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// 按置信度降序排列的分类结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationResult {
    entries: Vec<Classification>,
}

impl ClassificationResult {
    /// 构造时丢弃NaN、把置信度限制在[0,1]并排序
    pub fn new(entries: Vec<Classification>) -> Self {
        let mut entries: Vec<Classification> = entries
            .into_iter()
            .filter(|c| !c.confidence.is_nan())
            .map(|mut c| {
                c.confidence = c.confidence.clamp(0.0, 1.0);
                c
            })
            .collect();

        entries.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        Self { entries }
    }

    pub fn top(&self) -> Option<&Classification> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Classification> {
        self.entries.iter()
    }

    /// 只保留前k个
    pub fn truncate(&mut self, k: usize) {
        self.entries.truncate(k);
    }

    /// 置信度高于阈值的结果
    pub fn above(&self, threshold: f32) -> impl Iterator<Item = &Classification> {
        self.entries.iter().filter(move |c| c.confidence > threshold)
    }

    pub fn into_vec(self) -> Vec<Classification> {
        self.entries
    }
}

impl From<Vec<Classification>> for ClassificationResult {
    fn from(entries: Vec<Classification>) -> Self {
        Self::new(entries)
    }
}
