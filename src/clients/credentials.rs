//! 凭据管理
//!
//! API Key 只做存在性校验，永远不会出现在日志或错误信息中。

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::models::ProviderKind;

/// API Key，Debug 输出时隐藏内容
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// 空白字符串视为未设置
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// 凭据存储
pub trait CredentialStore: Send + Sync {
    /// 读取某个提供方当前的 API Key
    fn load(&self, provider: ProviderKind) -> Option<ApiKey>;
    /// 保存（覆盖）某个提供方的 API Key
    fn store(&self, provider: ProviderKind, key: ApiKey);
}

/// 纯内存存储
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<ProviderKind, ApiKey>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(provider: ProviderKind, key: &str) -> Self {
        let store = Self::default();
        if let Some(key) = ApiKey::new(key) {
            store.store(provider, key);
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, provider: ProviderKind) -> Option<ApiKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .cloned()
    }

    fn store(&self, provider: ProviderKind, key: ApiKey) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, key);
    }
}

/// 从环境变量读取，运行时设置的 Key 优先
#[derive(Default)]
pub struct EnvCredentialStore {
    overrides: MemoryCredentialStore,
}

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 各提供方对应的环境变量（按优先级）
    pub fn env_vars(provider: ProviderKind) -> &'static [&'static str] {
        match provider {
            ProviderKind::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            ProviderKind::Qwen => &["QWEN_API_KEY", "DASHSCOPE_API_KEY"],
            ProviderKind::OpenAi => &["LLM_API_KEY", "OPENAI_API_KEY"],
        }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn load(&self, provider: ProviderKind) -> Option<ApiKey> {
        self.overrides.load(provider).or_else(|| {
            Self::env_vars(provider)
                .iter()
                .find_map(|name| std::env::var(name).ok().and_then(ApiKey::new))
        })
    }

    fn store(&self, provider: ProviderKind, key: ApiKey) {
        self.overrides.store(provider, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_absent() {
        assert!(ApiKey::new("   ").is_none());
        assert_eq!(ApiKey::new(" sk-1 ").map(|k| k.expose().to_string()), Some("sk-1".to_string()));
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = ApiKey::new("sk-secret").expect("非空 key");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::with_key(ProviderKind::Qwen, "qwen-key");
        assert!(store.load(ProviderKind::Google).is_none());
        assert_eq!(
            store.load(ProviderKind::Qwen).map(|k| k.expose().to_string()),
            Some("qwen-key".to_string())
        );
    }

    #[test]
    fn test_env_store_prefers_runtime_override() {
        let store = EnvCredentialStore::new();
        store.store(ProviderKind::OpenAi, ApiKey::new("runtime").expect("非空 key"));
        assert_eq!(
            store.load(ProviderKind::OpenAi).map(|k| k.expose().to_string()),
            Some("runtime".to_string())
        );
    }
}
