//! # Exam Grader
//!
//! 多模态大模型试卷批改的编排层
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 每个上游服务一个 `ProviderAdapter` 实现
//! - `GeminiClient` / `QwenClient` / `OpenAiCompatibleClient`
//! - `HttpTransport` - 网络传输抽象，测试时可替换
//! - `CredentialStore` - API Key 存储，Key 不会出现在日志中
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，互相独立
//! - `ImagePreprocessor` - 缩放并重新编码图片
//! - `PromptBuilder` - 带版本号的提示词模板
//! - `extract_json` / `validate_grading` - 提取并校验模型输出
//! - `ModelCatalog` - 各提供方、各任务的候选模型列表
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - `FallbackChain` 按顺序尝试候选模型，带截止时间和取消
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - `GradingOrchestrator`，对外的唯一入口
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{
    ApiKey, CredentialStore, EnvCredentialStore, HttpTransport, MemoryCredentialStore,
    TransportRequest, TransportResponse,
};
pub use config::{Config, ConsistencyPolicy, FallbackMode};
pub use error::{AppError, AppResult};
pub use models::{
    EssayExamples, ExamGradingResult, ExamPage, GradingReport, ProviderKind, Question, RawImage,
    TaskKind,
};
pub use orchestrator::GradingOrchestrator;
