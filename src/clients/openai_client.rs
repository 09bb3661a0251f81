//! 兼容 OpenAI 接口的客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` 的类型构造 Chat Completions 请求体
//! - 请求经 `HttpTransport` 发出，每个候选模型只发一次，失败交给回退链处理
//! - 支持自定义 API 端点（Azure、各类 OpenAI 兼容网关等）
//! - 图片以 data URI 形式放进 Vision 消息

use std::sync::Arc;

use async_openai::{
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::credentials::ApiKey;
use crate::clients::provider::ProviderAdapter;
use crate::clients::transport::{classify_response, HttpTransport, TransportRequest};
use crate::error::UpstreamError;
use crate::models::{ImageEncoding, ImageProfile, PreparedImage, ProviderKind};

pub struct OpenAiCompatibleClient {
    api_key: ApiKey,
    api_base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: ApiKey, api_base_url: &str, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_key,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base_url)
    }

    fn build_messages(
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let user_msg = if images.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                Vec::with_capacity(images.len() + 1);

            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ));

            for image in images {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: image.data_uri(),
                            detail: Some(ImageDetail::High),
                        },
                    },
                ));
            }

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()?
        };

        Ok(vec![ChatCompletionRequestMessage::User(user_msg)])
    }

    fn build_request(
        model: &str,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(Self::build_messages(prompt, images)?)
            .temperature(0.3)
            .max_tokens(4096u32)
            .build()
    }

    fn transport_error(model: &str, status: Option<u16>, message: String) -> UpstreamError {
        UpstreamError::Transport {
            provider: ProviderKind::OpenAi,
            model: model.to_string(),
            status,
            message,
        }
    }

    fn parse_text(model: &str, payload: &Value) -> Result<String, UpstreamError> {
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| Self::transport_error(model, Some(200), "返回内容为空".to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn image_profile(&self) -> ImageProfile {
        ImageProfile {
            max_dimension_px: 1536,
            jpeg_quality: 80,
            max_size_bytes: Some(1024 * 1024),
            encoding: ImageEncoding::DataUri,
        }
    }

    /// 兼容网关的模型名没有统一前缀
    fn supports_model(&self, model: &str) -> bool {
        !model.trim().is_empty()
    }

    async fn call(
        &self,
        model: &str,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<String, UpstreamError> {
        debug!("调用 OpenAI 兼容接口，模型: {}，图片: {} 张", model, images.len());

        let request = Self::build_request(model, prompt, images)
            .map_err(|e| Self::transport_error(model, None, e.to_string()))?;
        let body = serde_json::to_value(&request)
            .map_err(|e| Self::transport_error(model, None, e.to_string()))?;

        let response = self
            .transport
            .post_json(TransportRequest {
                url: self.endpoint(),
                headers: vec![(
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key.expose()),
                )],
                body,
            })
            .await
            .map_err(|e| Self::transport_error(model, None, e.to_string()))?;

        let payload = classify_response(ProviderKind::OpenAi, model, &response).map_err(|e| {
            warn!("OpenAI 兼容接口调用失败 (模型: {}): {}", model, e);
            e
        })?;
        Self::parse_text(model, &payload)
    }
}
