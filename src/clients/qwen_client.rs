/// 通义千问 (DashScope) 多模态客户端
///
/// 图片必须先压缩到 800px 以内并以 data URI 发送，否则大图容易导致上游超时。
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::clients::credentials::ApiKey;
use crate::clients::provider::ProviderAdapter;
use crate::clients::transport::{classify_response, HttpTransport, TransportRequest};
use crate::error::UpstreamError;
use crate::models::{ImageEncoding, ImageProfile, PreparedImage, ProviderKind};

pub struct QwenClient {
    api_key: ApiKey,
    api_url: String,
    /// 例如 `https://corsproxy.io/?`
    proxy_url: Option<String>,
    transport: Arc<dyn HttpTransport>,
}

impl QwenClient {
    pub fn new(
        api_key: ApiKey,
        api_url: &str,
        proxy_url: Option<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_key,
            api_url: api_url.to_string(),
            proxy_url,
            transport,
        }
    }

    fn endpoint(&self) -> String {
        match &self.proxy_url {
            Some(proxy) => format!("{}{}", proxy, urlencoding::encode(&self.api_url)),
            None => self.api_url.clone(),
        }
    }

    fn build_body(model: &str, prompt: &str, images: &[PreparedImage]) -> Value {
        let mut content = vec![json!({ "text": prompt })];
        content.extend(images.iter().map(|img| json!({ "image": img.data_uri() })));

        json!({
            "model": model,
            "input": {
                "messages": [{ "role": "user", "content": content }]
            }
        })
    }

    /// content 可能是 [{text: ...}] 数组，也可能直接是字符串
    fn parse_text(model: &str, payload: &Value) -> Result<String, UpstreamError> {
        let text = match payload.pointer("/output/choices/0/message/content") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<String>(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        if text.trim().is_empty() {
            return Err(UpstreamError::Transport {
                provider: ProviderKind::Qwen,
                model: model.to_string(),
                status: Some(200),
                message: "无效的通义千问响应: 缺少 output.choices[0].message.content".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl ProviderAdapter for QwenClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Qwen
    }

    fn image_profile(&self) -> ImageProfile {
        ImageProfile {
            max_dimension_px: 800,
            jpeg_quality: 50,
            max_size_bytes: None,
            encoding: ImageEncoding::DataUri,
        }
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("qwen")
    }

    async fn call(
        &self,
        model: &str,
        prompt: &str,
        images: &[PreparedImage],
    ) -> Result<String, UpstreamError> {
        debug!("调用通义千问，模型: {}，图片: {} 张", model, images.len());

        let request = TransportRequest {
            url: self.endpoint(),
            headers: vec![(
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key.expose()),
            )],
            body: Self::build_body(model, prompt, images),
        };

        let response = self
            .transport
            .post_json(request)
            .await
            .map_err(|e| UpstreamError::Transport {
                provider: ProviderKind::Qwen,
                model: model.to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let payload = classify_response(ProviderKind::Qwen, model, &response)?;
        Self::parse_text(model, &payload)
    }
}
