use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use exam_grader::error::{ConfigError, ExtractionError, TransportError, UpstreamError};
use exam_grader::models::DataQualityIssue;
use exam_grader::{
    AppError, Config, ConsistencyPolicy, ExamGradingResult, GradingOrchestrator, HttpTransport,
    MemoryCredentialStore, ProviderKind, RawImage, TransportRequest, TransportResponse,
};

const GRADING_JSON: &str = r#"{"total_score":78,"total_max_score":100,"pages":[{"image_url":"page_1","page_score":40,"questions":[{"id":1,"status":"correct","score_obtained":10,"score_max":10,"deduction":0,"box_2d":[100,100,200,50],"analysis":""}]},{"image_url":"page_2","page_score":38,"questions":[]}],"summary_tags":["计算粗心"]}"#;

/// 按顺序返回预设响应，并记录每次请求
struct MockTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    fn new(responses: Vec<(u16, String)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| TransportResponse { status, body })
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> TransportRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_json(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError("没有预设响应".to_string()))
    }
}

fn gemini_reply(text: &str) -> (u16, String) {
    (
        200,
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string(),
    )
}

fn qwen_reply(text: &str) -> (u16, String) {
    (
        200,
        json!({ "output": { "choices": [{ "message": { "content": [{ "text": text }] } }] } })
            .to_string(),
    )
}

fn page_image(name: &str, width: u32, height: u32) -> RawImage {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 128]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    RawImage::new(name, bytes)
}

fn two_pages() -> Vec<RawImage> {
    vec![page_image("p1.png", 1200, 1600), page_image("p2.png", 1200, 1600)]
}

fn orchestrator(
    config: &Config,
    transport: Arc<MockTransport>,
    provider: ProviderKind,
) -> GradingOrchestrator {
    let credentials = Arc::new(MemoryCredentialStore::with_key(provider, "test-key"));
    GradingOrchestrator::with_parts(config, transport, credentials).unwrap()
}

#[tokio::test]
async fn test_grade_two_pages_end_to_end() {
    let transport = MockTransport::new(vec![gemini_reply(&format!(
        "以下是批改结果：\n```json\n{}\n```",
        GRADING_JSON
    ))]);
    let orch = orchestrator(&Config::default(), transport.clone(), ProviderKind::Google);

    let report = assert_ok!(orch.grade_exam(&two_pages(), 100.0).await);

    let expected: ExamGradingResult = serde_json::from_str(GRADING_JSON).unwrap();
    assert_eq!(report.result, expected);
    assert!(report.issues.is_empty());
    assert!(report.is_consistent());
    assert_eq!(report.model, "gemini-2.0-flash-exp");
    assert!(report.failed_attempts.is_empty());

    assert_eq!(transport.calls(), 1);
    let request = transport.request(0);
    let parts = request.body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 3);
    let prompt = parts[0]["text"].as_str().unwrap();
    assert!(prompt.contains("根据总分 100"));
    assert!(parts[1]["inline_data"]["data"].is_string());
    assert_eq!(parts[2]["inline_data"]["mime_type"], "image/jpeg");
}

#[tokio::test]
async fn test_inconsistent_total_accepted_with_warning() {
    let mut inconsistent: Value = serde_json::from_str(GRADING_JSON).unwrap();
    inconsistent["total_score"] = json!(90);
    let transport = MockTransport::new(vec![gemini_reply(&inconsistent.to_string())]);
    let orch = orchestrator(&Config::default(), transport, ProviderKind::Google);

    let report = assert_ok!(orch.grade_exam(&two_pages(), 100.0).await);
    assert_eq!(report.result.total_score, 90.0);
    assert_eq!(
        report.issues,
        vec![DataQualityIssue::TotalScoreMismatch {
            reported: 90.0,
            computed: 78.0
        }]
    );
    assert!(!report.is_consistent());
}

#[tokio::test]
async fn test_inconsistent_total_rejected_by_policy() {
    let mut inconsistent: Value = serde_json::from_str(GRADING_JSON).unwrap();
    inconsistent["total_score"] = json!(90);
    let transport = MockTransport::new(vec![gemini_reply(&inconsistent.to_string())]);
    let config = Config {
        consistency_policy: ConsistencyPolicy::Reject,
        ..Config::default()
    };
    let orch = orchestrator(&config, transport, ProviderKind::Google);

    let err = assert_err!(orch.grade_exam(&two_pages(), 100.0).await);
    assert!(err.is_data_quality());
    match err {
        AppError::DataQuality { issues, result } => {
            assert_eq!(issues.len(), 1);
            assert_eq!(result.total_score, 90.0);
        }
        other => panic!("意外的错误类型: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_credential_makes_no_network_call() {
    let transport = MockTransport::new(vec![gemini_reply(GRADING_JSON)]);
    let credentials = Arc::new(MemoryCredentialStore::new());
    let orch =
        GradingOrchestrator::with_parts(&Config::default(), transport.clone(), credentials).unwrap();

    let err = assert_err!(orch.grade_exam(&two_pages(), 100.0).await);
    assert!(matches!(
        err,
        AppError::Config(ConfigError::MissingCredential { .. })
    ));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_unavailable_first_model_falls_back() {
    let transport = MockTransport::new(vec![
        (
            404,
            r#"{"error":{"code":404,"message":"models/gemini-2.0-flash-exp is not found"}}"#
                .to_string(),
        ),
        gemini_reply(GRADING_JSON),
    ]);
    let orch = orchestrator(&Config::default(), transport.clone(), ProviderKind::Google);

    let report = assert_ok!(orch.grade_exam(&two_pages(), 100.0).await);
    assert_eq!(report.model, "gemini-1.5-pro-002");
    assert_eq!(report.failed_attempts.len(), 1);
    assert!(matches!(
        report.failed_attempts[0].error,
        UpstreamError::Transport {
            status: Some(404),
            ..
        }
    ));

    assert_eq!(transport.calls(), 2);
    assert!(transport.request(1).url.contains("gemini-1.5-pro-002"));
}

#[tokio::test]
async fn test_every_model_failing_reports_last_error() {
    let gateway_page = (504, "<!DOCTYPE html><html><body>504 Gateway Time-out</body></html>".to_string());
    let transport = MockTransport::new(vec![
        (500, r#"{"error":{"message":"internal"}}"#.to_string()),
        (404, r#"{"error":{"message":"not found"}}"#.to_string()),
        (503, r#"{"error":{"message":"overloaded"}}"#.to_string()),
        gateway_page,
    ]);
    let orch = orchestrator(&Config::default(), transport.clone(), ProviderKind::Google);

    let err = assert_err!(orch.grade_exam(&two_pages(), 100.0).await);
    match err {
        AppError::AllModelsExhausted(exhausted) => {
            assert_eq!(exhausted.attempts.len(), 4);
            assert!(matches!(
                exhausted.last,
                UpstreamError::GatewayTimeout {
                    status: Some(504),
                    ..
                }
            ));
        }
        other => panic!("意外的错误类型: {:?}", other),
    }
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_prose_without_json_is_extraction_error() {
    let transport = MockTransport::new(vec![gemini_reply("抱歉，图片太模糊，无法批改。")]);
    let orch = orchestrator(&Config::default(), transport, ProviderKind::Google);

    let err = assert_err!(orch.grade_exam(&two_pages(), 100.0).await);
    assert!(matches!(
        err,
        AppError::Extraction(ExtractionError::NoJsonFound { .. })
    ));
}

#[tokio::test]
async fn test_qwen_receives_downscaled_data_uris() {
    let transport = MockTransport::new(vec![qwen_reply(GRADING_JSON)]);
    let config = Config {
        provider: ProviderKind::Qwen,
        ..Config::default()
    };
    let orch = orchestrator(&config, transport.clone(), ProviderKind::Qwen);

    let report = assert_ok!(orch.grade_exam(&two_pages(), 100.0).await);
    assert_eq!(report.model, "qwen-vl-plus");

    let request = transport.request(0);
    assert!(request
        .headers
        .iter()
        .any(|(name, value)| name == "Authorization" && value == "Bearer test-key"));
    let content = request.body["input"]["messages"][0]["content"]
        .as_array()
        .unwrap();
    assert_eq!(content.len(), 3);
    for part in &content[1..] {
        let uri = part["image"].as_str().unwrap();
        let encoded = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let decoded = image::load_from_memory(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(decoded.width().max(decoded.height()) <= 800);
        assert_eq!((decoded.width(), decoded.height()), (600, 800));
    }
}

#[tokio::test]
async fn test_openai_gateway_page_moves_to_next_model() {
    let openai_reply = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 0,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": GRADING_JSON },
            "finish_reason": "stop"
        }]
    })
    .to_string();
    let transport = MockTransport::new(vec![
        (
            504,
            "<!DOCTYPE html><html><body><h1>504 Gateway Time-out</h1></body></html>".to_string(),
        ),
        (200, openai_reply),
    ]);
    let config = Config {
        provider: ProviderKind::OpenAi,
        llm_api_base_url: "http://127.0.0.1:9/v1".to_string(),
        ..Config::default()
    };
    let orch = orchestrator(&config, transport.clone(), ProviderKind::OpenAi);

    let started = std::time::Instant::now();
    let report = assert_ok!(orch.grade_exam(&two_pages(), 100.0).await);
    assert!(started.elapsed() < std::time::Duration::from_secs(30));

    assert_eq!(report.model, "gpt-4o-mini");
    assert_eq!(report.failed_attempts.len(), 1);
    assert!(matches!(
        report.failed_attempts[0].error,
        UpstreamError::GatewayTimeout {
            status: Some(504),
            ..
        }
    ));

    assert_eq!(transport.calls(), 2);
    assert_eq!(transport.request(0).url, "http://127.0.0.1:9/v1/chat/completions");
    assert_eq!(transport.request(0).body["model"], "gpt-4o");
    assert_eq!(transport.request(1).body["model"], "gpt-4o-mini");
}

#[tokio::test]
async fn test_switching_provider_at_runtime() {
    let transport = MockTransport::new(vec![qwen_reply("识别出的文字")]);
    let orch = orchestrator(&Config::default(), transport.clone(), ProviderKind::Google);

    assert_ok!(orch.set_api_key(ProviderKind::Qwen, "qwen-key"));
    assert_eq!(orch.provider(), ProviderKind::Qwen);

    let text = assert_ok!(orch.recognize_text(&page_image("note.png", 400, 300)).await);
    assert_eq!(text, "识别出的文字");
    assert!(transport.request(0).url.contains("dashscope"));
}
