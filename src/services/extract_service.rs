//! 从模型输出中提取 JSON
//!
//! 模型经常在 JSON 前后附带说明文字或 ```json 代码块，
//! 这里取第一个 `{` 到最后一个 `}` 之间的内容再解析。

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::utils::truncate_text;

const EXCERPT_LEN: usize = 200;

/// 提取并解析 JSON 对象
pub fn extract_json(raw: &str) -> Result<Value, ExtractionError> {
    let candidate = json_span(raw).ok_or_else(|| {
        warn!("模型输出中没有 JSON 对象");
        ExtractionError::NoJsonFound {
            excerpt: truncate_text(raw, EXCERPT_LEN),
        }
    })?;

    debug!("提取到 JSON 片段，长度: {} 字节", candidate.len());

    serde_json::from_str(candidate).map_err(|source| ExtractionError::MalformedJson {
        excerpt: truncate_text(candidate, EXCERPT_LEN),
        source,
    })
}

fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_output_with_prose() {
        let raw = "好的，批改结果如下：\n```json\n{\"total_score\": 85, \"nested\": {\"a\": 1}}\n```\n希望对你有帮助！";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["total_score"], 85);
        assert_eq!(value["nested"]["a"], 1);
    }

    #[test]
    fn test_no_braces() {
        let err = extract_json("抱歉，我无法识别这张图片").unwrap_err();
        match err {
            ExtractionError::NoJsonFound { excerpt } => assert!(excerpt.contains("无法识别")),
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_reversed_braces() {
        assert!(matches!(
            extract_json("} 没有对象 {"),
            Err(ExtractionError::NoJsonFound { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        let err = extract_json("结果: {\"total_score\": 85,, }").unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedJson { .. }));
    }

    #[test]
    fn test_long_output_excerpt_is_truncated() {
        let raw = "x".repeat(1000);
        match extract_json(&raw).unwrap_err() {
            ExtractionError::NoJsonFound { excerpt } => assert!(excerpt.chars().count() < 300),
            other => panic!("意外的错误类型: {:?}", other),
        }
    }
}
