use thiserror::Error;

use crate::models::{DataQualityIssue, ExamGradingResult, ModelAttempt, ProviderKind, TaskKind};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（凭据缺失、模型列表为空、模板无效等）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 调用方输入错误
    #[error("输入错误: {0}")]
    Input(#[from] InputError),
    /// 图片预处理错误
    #[error("图片错误: {0}")]
    Image(#[from] ImageError),
    /// 所有候选模型均失败
    #[error("{0}")]
    AllModelsExhausted(#[from] ExhaustedError),
    /// 模型输出中找不到结构化数据
    #[error("响应解析错误: {0}")]
    Extraction(#[from] ExtractionError),
    /// 结构化数据不符合约定的结构
    #[error("响应结构校验失败: {0}")]
    Schema(#[from] SchemaError),
    /// 批改结果自相矛盾（分数之和不一致等）
    #[error("批改结果数据不一致: {}", format_issues(.issues))]
    DataQuality {
        issues: Vec<DataQualityIssue>,
        result: Box<ExamGradingResult>,
    },
    /// 请求在模型调用过程中被取消
    #[error("请求已取消 (已失败 {} 次尝试)", .attempts.len())]
    Cancelled { attempts: Vec<ModelAttempt> },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 当前提供方没有可用的 API Key
    #[error("未设置 {provider} 的 API Key，请先配置凭据")]
    MissingCredential { provider: ProviderKind },
    /// 模型目录中没有该任务的候选模型
    #[error("{provider} 没有为任务 {task} 配置任何候选模型")]
    NoModelsConfigured {
        provider: ProviderKind,
        task: TaskKind,
    },
    /// 提示词模板缺失或无法渲染
    #[error("提示词模板错误 ({task}): {reason}")]
    PromptTemplate { task: String, reason: String },
    /// 目录文件读取或解析失败
    #[error("加载配置文件失败 ({path}): {reason}")]
    CatalogLoad { path: String, reason: String },
    /// HTTP 客户端无法创建
    #[error("HTTP 客户端初始化失败: {0}")]
    HttpClient(#[from] TransportError),
}

/// 输入错误（本地校验，不会触发网络请求）
#[derive(Debug, Error)]
pub enum InputError {
    #[error("没有提供任何图片")]
    NoImages,
    #[error("图片数量 {count} 超过上限 {max}")]
    TooManyImages { count: usize, max: usize },
    #[error("第 {} 张图片内容为空", .index + 1)]
    EmptyImage { index: usize },
    #[error("满分 {value} 不在有效范围 (0, 1000] 内")]
    InvalidMaxScore { value: f64 },
    #[error("参数 {field} 不能为空")]
    EmptyText { field: &'static str },
}

/// 图片处理错误，总是指向具体的某一张图片
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("第 {} 张图片无法解码: {source}", .index + 1)]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("第 {} 张图片压缩编码失败: {source}", .index + 1)]
    Encode {
        index: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("第 {} 张图片处理任务异常退出: {message}", .index + 1)]
    Worker { index: usize, message: String },
}

/// 单次模型调用失败（记录后继续尝试下一个候选模型）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpstreamError {
    /// 非 2xx 响应、网络故障或响应格式不合法
    #[error("{provider}/{model} 调用失败 (状态码: {}): {message}", format_status(.status))]
    Transport {
        provider: ProviderKind,
        model: String,
        status: Option<u16>,
        message: String,
    },
    /// 中间网关返回了 HTML 错误页
    #[error("{provider}/{model} 网关超时或代理连接失败 (状态码: {})", format_status(.status))]
    GatewayTimeout {
        provider: ProviderKind,
        model: String,
        status: Option<u16>,
    },
    /// 单次调用超过截止时间
    #[error("{provider}/{model} 调用超时 ({timeout_ms} ms)")]
    Deadline {
        provider: ProviderKind,
        model: String,
        timeout_ms: u64,
    },
    /// 当前提供方不支持该模型名
    #[error("{provider} 不支持模型 {model}")]
    UnsupportedModel {
        provider: ProviderKind,
        model: String,
    },
}

impl UpstreamError {
    /// 出错的模型名
    pub fn model(&self) -> &str {
        match self {
            UpstreamError::Transport { model, .. }
            | UpstreamError::GatewayTimeout { model, .. }
            | UpstreamError::Deadline { model, .. }
            | UpstreamError::UnsupportedModel { model, .. } => model,
        }
    }
}

/// 候选模型全部失败
#[derive(Debug, Error)]
#[error(
    "所有模型均调用失败 (提供方: {provider}, 任务: {task}, 共尝试 {} 个模型), 最后错误: {last}",
    .attempts.len()
)]
pub struct ExhaustedError {
    pub provider: ProviderKind,
    pub task: TaskKind,
    /// 按尝试顺序记录的全部失败
    pub attempts: Vec<ModelAttempt>,
    #[source]
    pub last: UpstreamError,
}

/// 从模型输出中提取 JSON 失败
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("模型输出中没有找到 JSON 对象: {excerpt}")]
    NoJsonFound { excerpt: String },
    #[error("模型输出的 JSON 格式错误 ({source}): {excerpt}")]
    MalformedJson {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 结构校验失败，指明具体字段
#[derive(Debug, Clone, PartialEq, Error)]
#[error("字段 `{field}` 无效: {reason}")]
pub struct SchemaError {
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 传输层故障（由 HttpTransport 实现返回）
#[derive(Debug, Error)]
#[error("网络请求失败: {0}")]
pub struct TransportError(pub String);

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建凭据缺失错误
    pub fn missing_credential(provider: ProviderKind) -> Self {
        AppError::Config(ConfigError::MissingCredential { provider })
    }

    /// 是否属于数据质量问题（重试同一模型通常无济于事）
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            AppError::Extraction(_) | AppError::Schema(_) | AppError::DataQuality { .. }
        )
    }
}

fn format_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "无".to_string(), |s| s.to_string())
}

fn format_issues(issues: &[DataQualityIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
