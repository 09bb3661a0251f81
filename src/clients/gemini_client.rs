/// Google Gemini 客户端
///
/// 调用 `models/{model}:generateContent`，图片以 base64 内联数据发送
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::clients::credentials::ApiKey;
use crate::clients::provider::ProviderAdapter;
use crate::clients::transport::{classify_response, HttpTransport, TransportRequest};
use crate::error::UpstreamError;
use crate::models::{ImageEncoding, ImageProfile, PreparedImage, ProviderKind};

pub struct GeminiClient {
    api_key: ApiKey,
    api_base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl GeminiClient {
    pub fn new(api_key: ApiKey, api_base_url: &str, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_key,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base_url, model
        )
    }

    fn build_body(prompt: &str, images: &[PreparedImage]) -> Value {
        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.base64_data(),
                }
            }));
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": 0.3 }
        })
    }

    /// 拼接第一个候选的所有文本片段
    fn parse_text(model: &str, payload: &Value) -> Result<String, UpstreamError> {
        let text = payload
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return Ok(text);
        }

        let reason = payload
            .pointer("/promptFeedback/blockReason")
            .or_else(|| payload.pointer("/candidates/0/finishReason"))
            .and_then(Value::as_str)
            .unwrap_or("无候选结果");

        Err(UpstreamError::Transport {
            provider: ProviderKind::Google,
            model: model.to_string(),
            status: Some(200),
            message: format!("响应中没有文本内容 ({})", reason),
        })
    }
}

#[async_trait]
impl ProviderAdapter for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn image_profile(&self) -> ImageProfile {
        ImageProfile {
            max_dimension_px: 1920,
            jpeg_quality: 80,
            max_size_bytes: Some(1024 * 1024),
            encoding: ImageEncoding::Binary,
        }
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("gemini-")
    }

    async fn call(
        &self,
        model: &str,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<String, UpstreamError> {
        debug!("调用 Gemini，模型: {}，图片: {} 张", model, images.len());

        let request = TransportRequest {
            url: self.endpoint(model),
            headers: vec![(
                "x-goog-api-key".to_string(),
                self.api_key.expose().to_string(),
            )],
            body: Self::build_body(prompt, images),
        };

        let response = self
            .transport
            .post_json(request)
            .await
            .map_err(|e| UpstreamError::Transport {
                provider: ProviderKind::Google,
                model: model.to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let payload = classify_response(ProviderKind::Google, model, &response)?;
        Self::parse_text(model, &payload)
    }
}
