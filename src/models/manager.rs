use crate::models::{Classifier, ModelSelector, OnnxClassifier};
use crate::utils::error::ClassifyError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// 模型管理器：启动时一次性加载并缓存所有分类器
pub struct ModelManager {
    classifiers: HashMap<ModelSelector, Arc<dyn Classifier>>,
    failures: HashMap<ModelSelector, String>,
    config: Config,
}

static MODEL_MANAGER: OnceCell<Arc<ModelManager>> = OnceCell::new();

impl ModelManager {
    /// 加载配置中的全部模型，单个模型失败只记录不中断
    pub fn load(config: Config) -> Self {
        let mut classifiers: HashMap<ModelSelector, Arc<dyn Classifier>> = HashMap::new();
        let mut failures = HashMap::new();

        for model in ModelSelector::ALL {
            match OnnxClassifier::new(&config, model) {
                Ok(classifier) => {
                    tracing::info!("{} model loaded successfully", model);
                    classifiers.insert(model, Arc::new(classifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to load {} model: {}", model, e);
                    failures.insert(model, e.to_string());
                }
            }
        }

        Self {
            classifiers,
            failures,
            config,
        }
    }

    /// 使用已构造好的分类器（自定义后端或测试桩）
    pub fn with_classifiers(config: Config, classifiers: Vec<Arc<dyn Classifier>>) -> Self {
        let classifiers: HashMap<_, _> = classifiers
            .into_iter()
            .map(|c| (c.model(), c))
            .collect();

        let failures = ModelSelector::ALL
            .into_iter()
            .filter(|m| !classifiers.contains_key(m))
            .map(|m| (m, "no classifier registered".to_string()))
            .collect();

        Self {
            classifiers,
            failures,
            config,
        }
    }

    /// 初始化全局模型管理器
    pub fn init(config: Config) -> Result<Arc<ModelManager>> {
        tracing::info!("Initializing model manager...");

        let manager = Self::load(config);
        if manager.classifiers.is_empty() {
            return Err(ClassifyError::ModelLoad(format!(
                "No classification models could be loaded from {}",
                manager.config.models_dir.display()
            )));
        }

        let manager = Arc::new(manager);
        MODEL_MANAGER
            .set(Arc::clone(&manager))
            .map_err(|_| ClassifyError::Internal("Model manager already initialized".to_string()))?;

        tracing::info!(
            "Model manager initialized: {}/{} models available",
            manager.classifiers.len(),
            ModelSelector::ALL.len()
        );
        Ok(manager)
    }

    /// 获取全局模型管理器实例
    pub fn instance() -> Result<Arc<ModelManager>> {
        MODEL_MANAGER
            .get()
            .cloned()
            .ok_or_else(|| ClassifyError::Internal("Model manager not initialized".to_string()))
    }

    /// 获取分类器；加载失败的模型返回 ModelLoad
    pub fn classifier(&self, model: ModelSelector) -> Result<Arc<dyn Classifier>> {
        if let Some(classifier) = self.classifiers.get(&model) {
            return Ok(Arc::clone(classifier));
        }

        let reason = self
            .failures
            .get(&model)
            .cloned()
            .unwrap_or_else(|| "not loaded".to_string());
        Err(ClassifyError::ModelLoad(format!(
            "{} is unavailable ({}); select a different model",
            model, reason
        )))
    }

    pub fn is_available(&self, model: ModelSelector) -> bool {
        self.classifiers.contains_key(&model)
    }

    /// 已加载的模型（按分段索引排序）
    pub fn available(&self) -> Vec<ModelSelector> {
        ModelSelector::ALL
            .into_iter()
            .filter(|m| self.is_available(*m))
            .collect()
    }

    /// 获取配置引用
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 至少有一个模型可用即视为健康
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");
        if self.classifiers.is_empty() {
            return Err(ClassifyError::ModelLoad("No classification models loaded".to_string()));
        }
        Ok(())
    }

    /// 获取模型统计信息
    pub fn get_stats(&self) -> ModelStats {
        let models = ModelSelector::ALL
            .into_iter()
            .map(|model| ModelStatus {
                model,
                loaded: self.is_available(model),
                error: self.failures.get(&model).cloned(),
            })
            .collect();

        ModelStats {
            models,
            default_model: self.config.default_model,
            intra_threads: self.config.onnx_config.intra_threads,
            optimization_level: self.config.onnx_config.optimization_level,
        }
    }
}

/// 单个模型的加载状态
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model: ModelSelector,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 模型统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub models: Vec<ModelStatus>,
    pub default_model: ModelSelector,
    pub intra_threads: usize,
    pub optimization_level: i32,
}
