//! 结构化输出校验
//!
//! 模型返回的 JSON 不可信：逐字段检查并给出具体路径
//! （例如 `pages[0].questions[2].status`），再做跨字段的一致性检查。

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SchemaError;
use crate::models::{
    DataQualityIssue, ErrorType, EssayExamples, ExamGradingResult, ExamPage, Question,
    QuestionStatus,
};

/// 分数比较的容差
const SCORE_TOLERANCE: f64 = 0.01;
/// box_2d 归一化坐标上限
const BOX_SCALE: f64 = 1000.0;

/// 校验批改结果的结构
pub fn validate_grading(value: &Value) -> Result<ExamGradingResult, SchemaError> {
    let root = as_object(value, "$")?;

    let total_score = number(root, "total_score", "")?;
    let total_max_score = number(root, "total_max_score", "")?;

    let pages = array(root, "pages", "")?
        .iter()
        .enumerate()
        .map(|(i, page)| validate_page(page, &format!("pages[{}]", i)))
        .collect::<Result<Vec<_>, _>>()?;

    let summary_tags = array(root, "summary_tags", "")?
        .iter()
        .enumerate()
        .map(|(i, tag)| {
            tag.as_str()
                .map(str::to_string)
                .ok_or_else(|| SchemaError::new(format!("summary_tags[{}]", i), "必须是字符串"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExamGradingResult {
        total_score,
        total_max_score,
        pages,
        summary_tags,
    })
}

fn validate_page(value: &Value, path: &str) -> Result<ExamPage, SchemaError> {
    let page = as_object(value, path)?;

    let image_url = string(page, "image_url", path)?;
    let page_score = number(page, "page_score", path)?;
    let questions = array(page, "questions", path)?
        .iter()
        .enumerate()
        .map(|(i, q)| validate_question(q, &format!("{}.questions[{}]", path, i)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExamPage {
        image_url,
        page_score,
        questions,
    })
}

fn validate_question(value: &Value, path: &str) -> Result<Question, SchemaError> {
    let question = as_object(value, path)?;

    let id = question_id(question, path)?;

    let status_raw = string(question, "status", path)?;
    let status = QuestionStatus::parse(&status_raw).ok_or_else(|| {
        SchemaError::new(
            join(path, "status"),
            format!("取值 \"{}\" 不在 correct/wrong/partial 之中", status_raw),
        )
    })?;

    let score_obtained = number(question, "score_obtained", path)?;
    let score_max = number(question, "score_max", path)?;
    let deduction = number(question, "deduction", path)?;
    let box_2d = bounding_box(question, path)?;

    let analysis = match question.get("analysis") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(SchemaError::new(join(path, "analysis"), "必须是字符串")),
    };
    if status != QuestionStatus::Correct && analysis.trim().is_empty() {
        return Err(SchemaError::new(
            join(path, "analysis"),
            "非正确题目必须给出解析",
        ));
    }

    // 正确题目常见 null 或空字符串，视为未填写
    let error_type = match question.get("error_type") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(ErrorType::parse(s).ok_or_else(|| {
            SchemaError::new(
                join(path, "error_type"),
                format!("取值 \"{}\" 不在 calculation/concept/logic 之中", s),
            )
        })?),
        Some(_) => return Err(SchemaError::new(join(path, "error_type"), "必须是字符串")),
    };

    Ok(Question {
        id,
        status,
        score_obtained,
        score_max,
        deduction,
        box_2d,
        analysis,
        error_type,
    })
}

/// 校验三种风格的范文
pub fn validate_essay(value: &Value) -> Result<EssayExamples, SchemaError> {
    let root = as_object(value, "$")?;
    let field = |key: &str| -> Result<String, SchemaError> {
        let text = string(root, key, "")?;
        if text.trim().is_empty() {
            return Err(SchemaError::new(key, "不能为空"));
        }
        Ok(text)
    };

    Ok(EssayExamples {
        creative: field("creative")?,
        philosophical: field("philosophical")?,
        analytical: field("analytical")?,
    })
}

/// 一致性检查，不修改结果
///
/// 返回空列表表示完全一致。
pub fn check_consistency(
    result: &ExamGradingResult,
    expected_max_score: f64,
) -> Vec<DataQualityIssue> {
    let mut issues = Vec::new();

    let computed = result.pages_score();
    if (result.total_score - computed).abs() > SCORE_TOLERANCE {
        issues.push(DataQualityIssue::TotalScoreMismatch {
            reported: result.total_score,
            computed,
        });
    }

    if (result.total_max_score - expected_max_score).abs() > SCORE_TOLERANCE {
        issues.push(DataQualityIssue::TotalMaxScoreMismatch {
            reported: result.total_max_score,
            expected: expected_max_score,
        });
    }

    for (page_index, page) in result.pages.iter().enumerate() {
        for question in &page.questions {
            if question.score_obtained > question.score_max + SCORE_TOLERANCE {
                issues.push(DataQualityIssue::ScoreExceedsMax {
                    page: page_index,
                    question_id: question.id,
                    obtained: question.score_obtained,
                    max: question.score_max,
                });
            }
            if !box_in_range(&question.box_2d) {
                issues.push(DataQualityIssue::BoxOutOfRange {
                    page: page_index,
                    question_id: question.id,
                    box_2d: question.box_2d,
                });
            }
        }
    }

    if !issues.is_empty() {
        warn!("⚠️ 批改结果发现 {} 处不一致", issues.len());
    }
    issues
}

fn box_in_range(b: &[f64; 4]) -> bool {
    let [x, y, w, h] = *b;
    b.iter().all(|v| *v >= 0.0) && x + w <= BOX_SCALE && y + h <= BOX_SCALE
}

// ========== 字段读取辅助函数 ==========

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaError> {
    value
        .as_object()
        .ok_or_else(|| SchemaError::new(path, "必须是 JSON 对象"))
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, SchemaError> {
    match obj.get(key) {
        Some(Value::Null) | None => Err(SchemaError::new(join(path, key), "缺少必填字段")),
        Some(value) => Ok(value),
    }
}

fn number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<f64, SchemaError> {
    let value = required(obj, key, path)?
        .as_f64()
        .ok_or_else(|| SchemaError::new(join(path, key), "必须是数字"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(SchemaError::new(
            join(path, key),
            format!("必须是非负数，实际为 {}", value),
        ));
    }
    Ok(value)
}

fn string(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, SchemaError> {
    required(obj, key, path)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SchemaError::new(join(path, key), "必须是字符串"))
}

fn array<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Vec<Value>, SchemaError> {
    required(obj, key, path)?
        .as_array()
        .ok_or_else(|| SchemaError::new(join(path, key), "必须是数组"))
}

fn question_id(obj: &Map<String, Value>, path: &str) -> Result<u32, SchemaError> {
    let value = required(obj, "id", path)?;
    let id = value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .and_then(|id| u32::try_from(id).ok())
        .filter(|id| *id > 0);
    id.ok_or_else(|| SchemaError::new(join(path, "id"), "必须是正整数"))
}

fn bounding_box(obj: &Map<String, Value>, path: &str) -> Result<[f64; 4], SchemaError> {
    let field = join(path, "box_2d");
    let items = required(obj, "box_2d", path)?
        .as_array()
        .filter(|items| items.len() == 4)
        .ok_or_else(|| SchemaError::new(field.as_str(), "必须是 4 个数字组成的数组"))?;

    let mut coords = [0.0; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| SchemaError::new(field.as_str(), "坐标必须是数字"))?;
    }
    Ok(coords)
}
