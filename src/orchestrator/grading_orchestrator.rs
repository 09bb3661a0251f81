//! 批改编排器 - 编排层
//!
//! ## 职责
//!
//! 对外的唯一入口。每个操作按同样的顺序执行：
//!
//! 1. **校验输入**：本地检查，不合法时不发出任何网络请求
//! 2. **读取凭据**：在调用开始时拿到当前提供方的快照
//! 3. **构建提示词**：交给 `PromptBuilder`
//! 4. **预处理图片**：按当前提供方的参数并行压缩
//! 5. **回退调用**：交给 `FallbackChain`
//! 6. **提取和校验**：仅结构化任务（批改、范文）
//!
//! 提供方、凭据和候选模型列表可以随时切换，已经拿到快照的请求不受影响。
//!
//! ## 取消
//!
//! - `cancel_all` 取消所有请求，之后的请求也会立即返回 Cancelled
//! - `*_with_cancel` 接收调用方的令牌，只取消这一个请求

use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

use crate::clients::{
    build_adapter, ApiKey, CredentialStore, EnvCredentialStore, HttpTransport, ProviderAdapter,
    ReqwestTransport,
};
use crate::config::{Config, ConsistencyPolicy};
use crate::error::{AppError, AppResult, ConfigError, InputError};
use crate::models::{EssayExamples, GradingReport, ProviderKind, RawImage, TaskKind};
use crate::services::{
    check_consistency, extract_json, validate_essay, validate_grading, ImagePreprocessor,
    ModelCatalog, PromptBuilder, TaskPrompt,
};
use crate::utils::logging::log_grading_summary;
use crate::workflow::{ChainSuccess, FallbackChain};

/// 满分上限
const MAX_TOTAL_SCORE: f64 = 1000.0;

/// 当前生效的提供方
///
/// 整体替换而不是原地修改，读取方拿到的 Arc 在整个请求期间保持不变。
struct ActiveProvider {
    kind: ProviderKind,
    /// 没有 API Key 时为 None
    adapter: Option<Arc<dyn ProviderAdapter>>,
}

pub struct GradingOrchestrator {
    config: Config,
    prompts: PromptBuilder,
    catalog: RwLock<ModelCatalog>,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    active: RwLock<Arc<ActiveProvider>>,
    shutdown: CancellationToken,
}

impl GradingOrchestrator {
    /// 使用 reqwest 和环境变量凭据创建
    pub fn new(config: &Config) -> AppResult<Self> {
        let transport = ReqwestTransport::new().map_err(ConfigError::from)?;
        Self::with_parts(config, Arc::new(transport), Arc::new(EnvCredentialStore::new()))
    }

    /// 注入传输层和凭据存储（嵌入方和测试使用）
    pub fn with_parts(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> AppResult<Self> {
        let prompts = PromptBuilder::load(config.prompts_file.as_deref())?;
        let catalog = ModelCatalog::load(config.models_file.as_deref())?;
        info!("📝 提示词模板版本: {}", prompts.version());

        let orchestrator = Self {
            config: config.clone(),
            prompts,
            catalog: RwLock::new(catalog),
            transport,
            credentials,
            active: RwLock::new(Arc::new(ActiveProvider {
                kind: config.provider,
                adapter: None,
            })),
            shutdown: CancellationToken::new(),
        };
        orchestrator.select_provider(config.provider);
        Ok(orchestrator)
    }

    // ========== 提供方与凭据 ==========

    /// 保存 API Key 并切换到该提供方
    pub fn set_api_key(&self, provider: ProviderKind, key: &str) -> AppResult<()> {
        let key = ApiKey::new(key).ok_or_else(|| AppError::missing_credential(provider))?;
        self.credentials.store(provider, key);
        info!("🔑 已更新 {} 的 API Key", provider);
        self.select_provider(provider);
        Ok(())
    }

    /// 切换提供方，使用已保存的凭据
    ///
    /// 没有凭据也会切换，后续调用返回 MissingCredential。
    pub fn select_provider(&self, provider: ProviderKind) {
        let adapter = self
            .credentials
            .load(provider)
            .map(|key| build_adapter(provider, key, &self.config, self.transport.clone()));

        if adapter.is_none() {
            warn!("⚠️ 提供方 {} 尚未配置 API Key", provider);
        }
        info!("🔌 当前提供方: {}", provider);

        let next = Arc::new(ActiveProvider {
            kind: provider,
            adapter,
        });
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn provider(&self) -> ProviderKind {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .kind
    }

    // ========== 候选模型 ==========

    /// 当前生效的候选模型列表
    pub fn candidates(&self, provider: ProviderKind, task: TaskKind) -> Vec<String> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .candidates(provider, task)
            .to_vec()
    }

    /// 运行时替换某个任务的候选列表（例如上游下线了某个模型）
    pub fn set_candidates(&self, provider: ProviderKind, task: TaskKind, models: Vec<String>) {
        info!("📋 更新 {} / {} 的候选模型: {:?}", provider, task, models);
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_candidates(provider, task, models);
    }

    /// 取消所有进行中的请求，之后的请求也会立即返回 Cancelled
    pub fn cancel_all(&self) {
        warn!("🛑 取消所有请求");
        self.shutdown.cancel();
    }

    /// 调用开始时的提供方快照
    fn snapshot(&self) -> AppResult<Arc<dyn ProviderAdapter>> {
        let active = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        active
            .adapter
            .clone()
            .ok_or_else(|| AppError::missing_credential(active.kind))
    }

    // ========== 对外操作 ==========

    /// 批改整份试卷
    ///
    /// 结果原样返回；一致性问题按配置的策略处理。
    pub async fn grade_exam(
        &self,
        images: &[RawImage],
        total_max_score: f64,
    ) -> AppResult<GradingReport> {
        self.grade_exam_with_cancel(images, total_max_score, &CancellationToken::new())
            .await
    }

    /// 同 `grade_exam`，`cancel` 被取消时只中止这一个请求
    pub async fn grade_exam_with_cancel(
        &self,
        images: &[RawImage],
        total_max_score: f64,
        cancel: &CancellationToken,
    ) -> AppResult<GradingReport> {
        self.validate_images(images)?;
        if !total_max_score.is_finite()
            || total_max_score <= 0.0
            || total_max_score > MAX_TOTAL_SCORE
        {
            return Err(InputError::InvalidMaxScore {
                value: total_max_score,
            }
            .into());
        }

        info!(
            "📄 开始批改试卷: {} 页，满分 {}",
            images.len(),
            total_max_score
        );

        let success = self
            .execute(
                TaskPrompt::GradeExam {
                    total_max_score,
                    page_count: images.len(),
                },
                images,
                cancel,
            )
            .await?;

        let value = extract_json(&success.text)?;
        let result = validate_grading(&value)?;
        let issues = check_consistency(&result, total_max_score);

        let blocking = issues.iter().any(|issue| !issue.is_advisory());
        if blocking && self.config.consistency_policy == ConsistencyPolicy::Reject {
            return Err(AppError::DataQuality {
                issues,
                result: Box::new(result),
            });
        }

        let report = GradingReport {
            result,
            issues,
            model: success.model,
            failed_attempts: success.failures,
        };
        log_grading_summary(&report);
        Ok(report)
    }

    /// 识别图片中的文字
    pub async fn recognize_text(&self, image: &RawImage) -> AppResult<String> {
        self.recognize_text_with_cancel(image, &CancellationToken::new())
            .await
    }

    pub async fn recognize_text_with_cancel(
        &self,
        image: &RawImage,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        self.validate_images(std::slice::from_ref(image))?;
        let success = self
            .execute(TaskPrompt::RecognizeText, std::slice::from_ref(image), cancel)
            .await?;
        Ok(success.text)
    }

    /// 解答作业题，instruction 为空时使用默认要求
    pub async fn solve_homework(
        &self,
        image: &RawImage,
        instruction: Option<&str>,
    ) -> AppResult<String> {
        self.solve_homework_with_cancel(image, instruction, &CancellationToken::new())
            .await
    }

    pub async fn solve_homework_with_cancel(
        &self,
        image: &RawImage,
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        self.validate_images(std::slice::from_ref(image))?;
        let success = self
            .execute(
                TaskPrompt::SolveHomework { instruction },
                std::slice::from_ref(image),
                cancel,
            )
            .await?;
        Ok(success.text)
    }

    /// 苏格拉底式辅导：引导而不是直接给答案
    pub async fn tutor_socratic(
        &self,
        question: &str,
        student_answer: Option<&str>,
    ) -> AppResult<String> {
        self.tutor_socratic_with_cancel(question, student_answer, &CancellationToken::new())
            .await
    }

    pub async fn tutor_socratic_with_cancel(
        &self,
        question: &str,
        student_answer: Option<&str>,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        require_text("question", question)?;
        let success = self
            .execute(
                TaskPrompt::TutorSocratic {
                    question,
                    student_answer,
                },
                &[],
                cancel,
            )
            .await?;
        Ok(success.text)
    }

    /// 生成三种风格的范文
    pub async fn generate_essay_examples(&self, topic: &str) -> AppResult<EssayExamples> {
        self.generate_essay_examples_with_cancel(topic, &CancellationToken::new())
            .await
    }

    pub async fn generate_essay_examples_with_cancel(
        &self,
        topic: &str,
        cancel: &CancellationToken,
    ) -> AppResult<EssayExamples> {
        require_text("topic", topic)?;
        let success = self
            .execute(TaskPrompt::EssayExamples { topic }, &[], cancel)
            .await?;
        let value = extract_json(&success.text)?;
        Ok(validate_essay(&value)?)
    }

    // ========== 内部流程 ==========

    async fn execute(
        &self,
        prompt: TaskPrompt<'_>,
        images: &[RawImage],
        caller: &CancellationToken,
    ) -> AppResult<ChainSuccess> {
        let adapter = self.snapshot()?;
        let task: TaskKind = prompt.kind();
        let text = self.prompts.build(&prompt)?;

        let prepared = if images.is_empty() {
            Vec::new()
        } else {
            ImagePreprocessor::new(adapter.image_profile())
                .prepare_all(images)
                .await?
        };

        let candidates = self.candidates(adapter.kind(), task);

        // 请求令牌挂在全局令牌下，调用方令牌被取消时一并取消；请求结束时 guard 收尾
        let cancel = self.shutdown.child_token();
        let _guard = link_caller(caller.clone(), cancel.clone());

        FallbackChain::new(
            adapter.as_ref(),
            self.config.attempt_timeout(),
            self.config.fallback_mode,
        )
        .run(task, &candidates, &text, &prepared, &cancel)
        .await
    }

    fn validate_images(&self, images: &[RawImage]) -> Result<(), InputError> {
        if images.is_empty() {
            return Err(InputError::NoImages);
        }
        if images.len() > self.config.max_images {
            return Err(InputError::TooManyImages {
                count: images.len(),
                max: self.config.max_images,
            });
        }
        match images.iter().position(|image| image.bytes.is_empty()) {
            Some(index) => Err(InputError::EmptyImage { index }),
            None => Ok(()),
        }
    }
}

/// 调用方令牌被取消时取消请求令牌；返回的 guard 被丢弃时结束转发任务
fn link_caller(caller: CancellationToken, request: CancellationToken) -> DropGuard {
    let guard = request.clone().drop_guard();
    if caller.is_cancelled() {
        request.cancel();
    } else {
        tokio::spawn(async move {
            tokio::select! {
                _ = caller.cancelled() => request.cancel(),
                _ = request.cancelled() => {}
            }
        });
    }
    guard
}

fn require_text(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.trim().is_empty() {
        return Err(InputError::EmptyText { field });
    }
    Ok(())
}
