use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 上游多模态服务提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini (generateContent)
    Google,
    /// 通义千问 DashScope 多模态接口
    Qwen,
    /// 兼容 OpenAI Chat Completions 的服务
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Qwen => "qwen",
            ProviderKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(ProviderKind::Google),
            "qwen" | "dashscope" => Ok(ProviderKind::Qwen),
            "openai" | "openai-compatible" => Ok(ProviderKind::OpenAi),
            other => Err(format!("未知的提供方: {}", other)),
        }
    }
}
