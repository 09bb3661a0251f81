//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层是调用方唯一需要接触的入口，负责把各层能力串成完整的请求流程。
//!
//! ## 模块划分
//!
//! ### `grading_orchestrator` - 批改编排器
//! - 校验输入（图片数量、满分范围、空文本）
//! - 管理当前提供方和凭据（可随时切换，请求开始时取快照）
//! - 调度图片预处理、提示词构建、模型回退链
//! - 结构化任务的提取、结构校验和一致性检查
//! - 提供全局取消
//!
//! ## 层次关系
//!
//! ```text
//! grading_orchestrator (处理一次请求)
//!     ↓
//! workflow::FallbackChain (按顺序尝试候选模型)
//!     ↓
//! clients::ProviderAdapter (Gemini / 通义千问 / OpenAI 兼容)
//!     ↓
//! clients::HttpTransport (reqwest)
//! ```
//!
//! services（图片、提示词、提取、校验、模型目录）由编排层直接调用，彼此之间不互相依赖。

pub mod grading_orchestrator;

// 重新导出主要类型
pub use grading_orchestrator::GradingOrchestrator;
