use std::str::FromStr;
use std::time::Duration;

use crate::models::ProviderKind;

/// 候选模型的调用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// 依次尝试，前一个失败才调用下一个
    Sequential,
    /// 同时调用全部候选，取最先成功的结果
    Race,
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(FallbackMode::Sequential),
            "race" => Ok(FallbackMode::Race),
            other => Err(format!("未知的回退模式: {}", other)),
        }
    }
}

/// 批改结果不一致时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyPolicy {
    /// 记录警告并返回结果
    AcceptWithWarning,
    /// 返回 DataQuality 错误
    Reject,
}

impl FromStr for ConsistencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" | "warn" => Ok(ConsistencyPolicy::AcceptWithWarning),
            "reject" => Ok(ConsistencyPolicy::Reject),
            other => Err(format!("未知的一致性策略: {}", other)),
        }
    }
}

/// 程序配置
///
/// API Key 不在这里，由 `CredentialStore` 提供。
#[derive(Clone, Debug)]
pub struct Config {
    /// 启动时使用的提供方
    pub provider: ProviderKind,
    // --- 提供方端点 ---
    pub gemini_api_base_url: String,
    pub qwen_api_url: String,
    /// 可选代理前缀，目标地址会被 URL 编码后拼接在后面
    pub qwen_proxy_url: Option<String>,
    pub llm_api_base_url: String,
    // --- 调用策略 ---
    /// 单次模型调用的截止时间（秒）
    pub attempt_timeout_secs: u64,
    pub fallback_mode: FallbackMode,
    /// 单次请求允许的最大图片数
    pub max_images: usize,
    pub consistency_policy: ConsistencyPolicy,
    // --- 外置目录 ---
    /// 覆盖内置模型目录的 TOML 文件
    pub models_file: Option<String>,
    /// 覆盖内置提示词模板的 TOML 文件
    pub prompts_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Google,
            gemini_api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            qwen_api_url:
                "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation"
                    .to_string(),
            qwen_proxy_url: None,
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            attempt_timeout_secs: 90,
            fallback_mode: FallbackMode::Sequential,
            max_images: 20,
            consistency_policy: ConsistencyPolicy::AcceptWithWarning,
            models_file: None,
            prompts_file: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            provider: parse_env("PROVIDER").unwrap_or(default.provider),
            gemini_api_base_url: std::env::var("GEMINI_API_BASE_URL")
                .unwrap_or(default.gemini_api_base_url),
            qwen_api_url: std::env::var("QWEN_API_URL").unwrap_or(default.qwen_api_url),
            qwen_proxy_url: non_empty_env("QWEN_PROXY_URL").or(default.qwen_proxy_url),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL")
                .unwrap_or(default.llm_api_base_url),
            attempt_timeout_secs: parse_env("ATTEMPT_TIMEOUT_SECS")
                .unwrap_or(default.attempt_timeout_secs),
            fallback_mode: parse_env("FALLBACK_MODE").unwrap_or(default.fallback_mode),
            max_images: parse_env("MAX_IMAGES").unwrap_or(default.max_images),
            consistency_policy: parse_env("CONSISTENCY_POLICY")
                .unwrap_or(default.consistency_policy),
            models_file: non_empty_env("MODELS_FILE").or(default.models_file),
            prompts_file: non_empty_env("PROMPTS_FILE").or(default.prompts_file),
            verbose_logging: parse_env("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.provider, ProviderKind::Google);
        assert_eq!(config.fallback_mode, FallbackMode::Sequential);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(90));
        assert!(config.qwen_proxy_url.is_none());
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("RACE".parse::<FallbackMode>(), Ok(FallbackMode::Race));
        assert_eq!(
            "reject".parse::<ConsistencyPolicy>(),
            Ok(ConsistencyPolicy::Reject)
        );
        assert!("sometimes".parse::<ConsistencyPolicy>().is_err());
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = Config {
            attempt_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.attempt_timeout(), Duration::from_secs(1));
    }
}
