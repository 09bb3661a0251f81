//! 网络传输层
//!
//! 提供方适配器只通过 `HttpTransport` 发请求，测试时可以替换成脚本化的实现。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{TransportError, UpstreamError};
use crate::models::ProviderKind;
use crate::utils::truncate_text;

/// 一次 JSON POST 请求
///
/// headers 里可能有凭据，所以不实现 Debug。
#[derive(Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// 原始响应
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, request: TransportRequest)
        -> Result<TransportResponse, TransportError>;
}

/// 基于 reqwest 的实现
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        debug!("HTTP {} 响应长度: {} 字节", status, body.len());
        Ok(TransportResponse { status, body })
    }
}

/// 判断响应体是否是 HTML 页面（网关/代理的错误页）
pub fn looks_like_html(body: &str) -> bool {
    static HTML_PAGE: OnceLock<Option<Regex>> = OnceLock::new();
    HTML_PAGE
        .get_or_init(|| Regex::new(r"(?i)<!doctype\s+html|<html[\s>]").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(body))
}

/// 对原始响应分类：HTML 错误页、非 2xx、非法 JSON 都转成 UpstreamError
pub fn classify_response(
    provider: ProviderKind,
    model: &str,
    response: &TransportResponse,
) -> Result<Value, UpstreamError> {
    // 2xx 的 JSON 里可能合法地包含 "<html" 字样，只看开头
    let html_page = if response.is_success() {
        response.body.trim_start().starts_with('<') && looks_like_html(&response.body)
    } else {
        looks_like_html(&response.body)
    };
    if html_page {
        return Err(UpstreamError::GatewayTimeout {
            provider,
            model: model.to_string(),
            status: Some(response.status),
        });
    }

    let parsed = serde_json::from_str::<Value>(&response.body);

    if !response.is_success() {
        let message = parsed
            .ok()
            .as_ref()
            .and_then(provider_error_message)
            .unwrap_or_else(|| truncate_text(&response.body, 200));
        return Err(UpstreamError::Transport {
            provider,
            model: model.to_string(),
            status: Some(response.status),
            message,
        });
    }

    parsed.map_err(|e| UpstreamError::Transport {
        provider,
        model: model.to_string(),
        status: Some(response.status),
        message: format!(
            "响应不是合法 JSON ({}): {}",
            e,
            truncate_text(&response.body, 200)
        ),
    })
}

/// 提取各家错误体中的 message（Gemini/OpenAI: error.message，DashScope: message）
fn provider_error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(|s| truncate_text(s, 200))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> TransportResponse {
        TransportResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_html_error_page_is_gateway_timeout() {
        let resp = response(504, "<!DOCTYPE html><html><body>Gateway Timeout</body></html>");
        let err = classify_response(ProviderKind::Qwen, "qwen-vl-plus", &resp).unwrap_err();
        assert_eq!(
            err,
            UpstreamError::GatewayTimeout {
                provider: ProviderKind::Qwen,
                model: "qwen-vl-plus".to_string(),
                status: Some(504),
            }
        );
    }

    #[test]
    fn test_html_with_success_status_is_not_model_output() {
        let resp = response(200, "<html>\n<head><title>proxy</title></head></html>");
        let err = classify_response(ProviderKind::Qwen, "qwen-vl-plus", &resp).unwrap_err();
        assert!(matches!(err, UpstreamError::GatewayTimeout { .. }));
    }

    #[test]
    fn test_non_2xx_uses_provider_message() {
        let resp = response(404, r#"{"error":{"code":404,"message":"models/x is not found"}}"#);
        let err = classify_response(ProviderKind::Google, "x", &resp).unwrap_err();
        match err {
            UpstreamError::Transport { status, message, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(message, "models/x is not found");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_body_is_transport_error() {
        let resp = response(200, "not json");
        let err = classify_response(ProviderKind::Google, "gemini-1.5-pro", &resp).unwrap_err();
        assert!(matches!(err, UpstreamError::Transport { status: Some(200), .. }));
    }

    #[test]
    fn test_valid_json_passes_through() {
        let resp = response(200, r#"{"ok":true}"#);
        let value = classify_response(ProviderKind::Google, "m", &resp).unwrap();
        assert_eq!(value["ok"], Value::Bool(true));
    }
}
