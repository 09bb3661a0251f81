//! 提供方适配器接口
//!
//! 每个上游服务一个实现，在配置时选定一次，调用处不再按提供方分支。

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::credentials::ApiKey;
use crate::clients::gemini_client::GeminiClient;
use crate::clients::openai_client::OpenAiCompatibleClient;
use crate::clients::qwen_client::QwenClient;
use crate::clients::transport::HttpTransport;
use crate::config::Config;
use crate::error::UpstreamError;
use crate::models::{ImageProfile, PreparedImage, ProviderKind};

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// 该提供方要求的图片尺寸/编码
    fn image_profile(&self) -> ImageProfile;

    fn supports_model(&self, model: &str) -> bool;

    /// 发送提示词和图片，返回模型的原始文本输出
    async fn call(
        &self,
        model: &str,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<String, UpstreamError>;
}

/// 根据提供方类型创建适配器
///
/// 必须持有 API Key 才能创建，缺少凭据在更早的阶段就会报错。
pub fn build_adapter(
    kind: ProviderKind,
    api_key: ApiKey,
    config: &Config,
    transport: Arc<dyn HttpTransport>,
) -> Arc<dyn ProviderAdapter> {
    match kind {
        ProviderKind::Google => Arc::new(GeminiClient::new(
            api_key,
            &config.gemini_api_base_url,
            transport,
        )),
        ProviderKind::Qwen => Arc::new(QwenClient::new(
            api_key,
            &config.qwen_api_url,
            config.qwen_proxy_url.clone(),
            transport,
        )),
        ProviderKind::OpenAi => Arc::new(OpenAiCompatibleClient::new(
            api_key,
            &config.llm_api_base_url,
            transport,
        )),
    }
}
