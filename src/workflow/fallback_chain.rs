//! 模型回退链 - 流程层
//!
//! 按配置顺序逐个尝试候选模型，第一个成功即返回。
//! 每次调用都有截止时间，两次尝试之间检查取消信号。
//!
//! 失败被认为是"该模型此刻不可用"而不是拥塞，所以尝试之间没有退避等待。

use std::time::{Duration, Instant};

use chrono::Local;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clients::ProviderAdapter;
use crate::config::FallbackMode;
use crate::error::{AppError, AppResult, ConfigError, ExhaustedError, UpstreamError};
use crate::models::{ModelAttempt, PreparedImage, TaskKind};

/// 回退链成功的结果
#[derive(Debug, Clone)]
pub struct ChainSuccess {
    /// 模型的原始文本输出
    pub text: String,
    /// 实际成功的模型
    pub model: String,
    /// 成功前的失败记录
    pub failures: Vec<ModelAttempt>,
}

pub struct FallbackChain<'a> {
    adapter: &'a dyn ProviderAdapter,
    attempt_timeout: Duration,
    mode: FallbackMode,
}

impl<'a> FallbackChain<'a> {
    pub fn new(
        adapter: &'a dyn ProviderAdapter,
        attempt_timeout: Duration,
        mode: FallbackMode,
    ) -> Self {
        Self {
            adapter,
            attempt_timeout,
            mode,
        }
    }

    pub async fn run(
        &self,
        task: TaskKind,
        candidates: &[String],
        prompt: &str,
        images: &[PreparedImage],
        cancel: &CancellationToken,
    ) -> AppResult<ChainSuccess> {
        if candidates.is_empty() {
            return Err(ConfigError::NoModelsConfigured {
                provider: self.adapter.kind(),
                task,
            }
            .into());
        }

        info!(
            "🤖 [{}] 开始调用 {}，候选模型 {} 个 ({:?})",
            task,
            self.adapter.kind(),
            candidates.len(),
            self.mode
        );

        match self.mode {
            FallbackMode::Sequential => {
                self.run_sequential(task, candidates, prompt, images, cancel)
                    .await
            }
            FallbackMode::Race => self.run_race(task, candidates, prompt, images, cancel).await,
        }
    }

    async fn run_sequential(
        &self,
        task: TaskKind,
        candidates: &[String],
        prompt: &str,
        images: &[PreparedImage],
        cancel: &CancellationToken,
    ) -> AppResult<ChainSuccess> {
        let mut failures: Vec<ModelAttempt> = Vec::new();

        for (i, model) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("🛑 [{}] 已取消，剩余 {} 个模型未尝试", task, candidates.len() - i);
                return Err(AppError::Cancelled { attempts: failures });
            }

            info!("[{}] 尝试模型 {}/{}: {}", task, i + 1, candidates.len(), model);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("🛑 [{}] 模型 {} 调用中被取消", task, model);
                    return Err(AppError::Cancelled { attempts: failures });
                }
                outcome = self.attempt(model, prompt, images) => outcome,
            };

            match outcome {
                Ok(text) => {
                    info!("✅ [{}] 模型 {} 调用成功", task, model);
                    return Ok(ChainSuccess {
                        text,
                        model: model.clone(),
                        failures,
                    });
                }
                Err(attempt) => {
                    warn!(
                        "⚠️ [{}] 模型 {} 失败 ({} ms): {}",
                        task, model, attempt.elapsed_ms, attempt.error
                    );
                    failures.push(attempt);
                }
            }
        }

        Err(self.exhausted(task, failures))
    }

    /// 同时调用全部候选，取最先成功的一个，其余调用随之丢弃
    async fn run_race(
        &self,
        task: TaskKind,
        candidates: &[String],
        prompt: &str,
        images: &[PreparedImage],
        cancel: &CancellationToken,
    ) -> AppResult<ChainSuccess> {
        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .map(|model| async move { (model, self.attempt(model, prompt, images).await) })
            .collect();
        let mut failures: Vec<ModelAttempt> = Vec::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("🛑 [{}] 竞速调用被取消", task);
                    return Err(AppError::Cancelled { attempts: failures });
                }
                next = pending.next() => match next {
                    Some((model, Ok(text))) => {
                        info!("✅ [{}] 模型 {} 最先返回", task, model);
                        return Ok(ChainSuccess {
                            text,
                            model: model.clone(),
                            failures,
                        });
                    }
                    Some((model, Err(attempt))) => {
                        warn!("⚠️ [{}] 模型 {} 失败: {}", task, model, attempt.error);
                        failures.push(attempt);
                    }
                    None => break,
                },
            }
        }

        Err(self.exhausted(task, failures))
    }

    /// 单次尝试：检查模型名、带截止时间调用
    async fn attempt(
        &self,
        model: &str,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<String, ModelAttempt> {
        let started_at = Local::now();
        let started = Instant::now();
        let provider = self.adapter.kind();

        let outcome = if !self.adapter.supports_model(model) {
            Err(UpstreamError::UnsupportedModel {
                provider,
                model: model.to_string(),
            })
        } else {
            match tokio::time::timeout(
                self.attempt_timeout,
                self.adapter.call(model, prompt, images),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Deadline {
                    provider,
                    model: model.to_string(),
                    timeout_ms: duration_ms(self.attempt_timeout),
                }),
            }
        };

        outcome.map_err(|error| ModelAttempt {
            model: model.to_string(),
            error,
            started_at,
            elapsed_ms: duration_ms(started.elapsed()),
        })
    }

    fn exhausted(&self, task: TaskKind, failures: Vec<ModelAttempt>) -> AppError {
        let provider = self.adapter.kind();
        match failures.last().map(|attempt| attempt.error.clone()) {
            Some(last) => {
                warn!("❌ [{}] {} 个候选模型全部失败", task, failures.len());
                ExhaustedError {
                    provider,
                    task,
                    attempts: failures,
                    last,
                }
                .into()
            }
            None => ConfigError::NoModelsConfigured { provider, task }.into(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod testing {
    //! 按模型名预设结果的适配器

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{ImageEncoding, ImageProfile, ProviderKind};

    #[derive(Clone)]
    pub struct Scripted {
        pub delay: Duration,
        pub result: Result<String, UpstreamError>,
    }

    pub struct MockAdapter {
        scripts: HashMap<String, Scripted>,
        calls: Mutex<Vec<String>>,
    }

    impl MockAdapter {
        pub fn new() -> Self {
            Self {
                scripts: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(mut self, model: &str, text: &str) -> Self {
            self.scripts.insert(
                model.to_string(),
                Scripted {
                    delay: Duration::ZERO,
                    result: Ok(text.to_string()),
                },
            );
            self
        }

        pub fn fail(mut self, model: &str, status: u16) -> Self {
            self.scripts.insert(
                model.to_string(),
                Scripted {
                    delay: Duration::ZERO,
                    result: Err(transport_error(model, status)),
                },
            );
            self
        }

        pub fn slow(mut self, model: &str, delay: Duration, text: &str) -> Self {
            self.scripts.insert(
                model.to_string(),
                Scripted {
                    delay,
                    result: Ok(text.to_string()),
                },
            );
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    pub fn transport_error(model: &str, status: u16) -> UpstreamError {
        UpstreamError::Transport {
            provider: ProviderKind::Google,
            model: model.to_string(),
            status: Some(status),
            message: format!("HTTP {}", status),
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Google
        }

        fn image_profile(&self) -> ImageProfile {
            ImageProfile {
                max_dimension_px: 64,
                jpeg_quality: 80,
                max_size_bytes: None,
                encoding: ImageEncoding::Binary,
            }
        }

        fn supports_model(&self, model: &str) -> bool {
            !model.starts_with("unsupported")
        }

        async fn call(
            &self,
            model: &str,
            _prompt: &str,
            _images: &[PreparedImage],
        ) -> Result<String, UpstreamError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(model.to_string());
            }
            let script = self
                .scripts
                .get(model)
                .cloned()
                .unwrap_or_else(|| Scripted {
                    delay: Duration::ZERO,
                    result: Err(transport_error(model, 404)),
                });
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            script.result
        }
    }
}
