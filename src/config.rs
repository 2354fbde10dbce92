use crate::models::ModelSelector;
use crate::utils::error::ClassifyError;
use crate::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// 未指定时使用的模型
    pub default_model: ModelSelector,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 预处理默认值
    pub processing: ProcessingDefaults,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,

    /// 启用图优化
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 同时进行的分类任务上限
    pub max_concurrent_jobs: usize,
}

/// 预处理与结果输出的默认参数
#[derive(Debug, Clone)]
pub struct ProcessingDefaults {
    /// 请求未指定时是否预处理
    pub preprocess: bool,

    /// 分类器期望的输入边长，用于居中裁剪+缩放
    pub target_size: u32,

    /// 默认对比度系数
    pub contrast: f64,

    /// 返回的候选数量
    pub top_k: usize,

    /// 日志中输出候选项的最低置信度
    pub log_threshold: f32,
}

impl Default for ProcessingDefaults {
    fn default() -> Self {
        Self {
            preprocess: true,
            target_size: 224,
            contrast: 1.0,
            top_k: 5,
            log_threshold: 0.05,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);
        if workers == 0 {
            return Err(ClassifyError::Config("workers must be at least 1".to_string()));
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
            enable_optimization: true,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 50 * 1024 * 1024, // 50MB
            max_concurrent_jobs: if dev_mode { 2 } else { workers },
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            workers,
            dev_mode,
            default_model: ModelSelector::default(),
            onnx_config,
            server_config,
            processing: ProcessingDefaults::default(),
        })
    }

    pub fn with_default_model(mut self, model: ModelSelector) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_processing(mut self, processing: ProcessingDefaults) -> Self {
        self.processing = processing;
        self
    }

    /// 模型目录
    pub fn model_dir(&self, model: ModelSelector) -> PathBuf {
        self.models_dir.join(model.spec().dir_name)
    }

    /// 获取模型文件路径
    pub fn model_path(&self, model: ModelSelector) -> PathBuf {
        self.model_dir(model).join("model.onnx")
    }

    /// 获取标签文件路径
    pub fn labels_path(&self, model: ModelSelector) -> PathBuf {
        self.model_dir(model).join("labels.txt")
    }
}
