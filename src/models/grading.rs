//! 批改结果数据模型
//!
//! 字段名即对外 JSON 契约，不能改名。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::task::ModelAttempt;

/// 单题判定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Correct,
    Wrong,
    Partial,
}

impl QuestionStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "correct" => Some(QuestionStatus::Correct),
            "wrong" => Some(QuestionStatus::Wrong),
            "partial" => Some(QuestionStatus::Partial),
            _ => None,
        }
    }
}

/// 错误类型分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// 计算错误
    Calculation,
    /// 概念错误
    Concept,
    /// 逻辑错误
    Logic,
}

impl ErrorType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calculation" => Some(ErrorType::Calculation),
            "concept" => Some(ErrorType::Concept),
            "logic" => Some(ErrorType::Logic),
            _ => None,
        }
    }
}

/// 一道题的批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// 题号，仅在单页内唯一
    pub id: u32,
    pub status: QuestionStatus,
    pub score_obtained: f64,
    pub score_max: f64,
    /// 扣分，仅供参考，不保证等于 score_max - score_obtained
    pub deduction: f64,
    /// [x, y, width, height]，0-1000 归一化坐标
    pub box_2d: [f64; 4],
    #[serde(default)]
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

/// 一页试卷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamPage {
    pub image_url: String,
    pub page_score: f64,
    pub questions: Vec<Question>,
}

/// 整份试卷的批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamGradingResult {
    pub total_score: f64,
    pub total_max_score: f64,
    pub pages: Vec<ExamPage>,
    pub summary_tags: Vec<String>,
}

impl ExamGradingResult {
    /// 各页 page_score 之和
    pub fn pages_score(&self) -> f64 {
        self.pages.iter().map(|p| p.page_score).sum()
    }

    pub fn question_count(&self) -> usize {
        self.pages.iter().map(|p| p.questions.len()).sum()
    }
}

/// 三种风格的范文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssayExamples {
    pub creative: String,
    pub philosophical: String,
    pub analytical: String,
}

/// 解析成功但数据自相矛盾的情况
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityIssue {
    /// total_score 与各页 page_score 之和不一致
    TotalScoreMismatch { reported: f64, computed: f64 },
    /// total_max_score 与调用方给定的满分不一致
    TotalMaxScoreMismatch { reported: f64, expected: f64 },
    /// 单题得分超过该题满分
    ScoreExceedsMax {
        page: usize,
        question_id: u32,
        obtained: f64,
        max: f64,
    },
    /// 坐标框超出 0-1000 范围（模型经常如此，只作提示）
    BoxOutOfRange {
        page: usize,
        question_id: u32,
        box_2d: [f64; 4],
    },
}

impl DataQualityIssue {
    /// 仅作提示、不应导致拒绝的问题
    pub fn is_advisory(&self) -> bool {
        matches!(self, DataQualityIssue::BoxOutOfRange { .. })
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityIssue::TotalScoreMismatch { reported, computed } => write!(
                f,
                "总分 {} 与各页得分之和 {} 不一致",
                reported, computed
            ),
            DataQualityIssue::TotalMaxScoreMismatch { reported, expected } => {
                write!(f, "满分 {} 与设定的满分 {} 不一致", reported, expected)
            }
            DataQualityIssue::ScoreExceedsMax {
                page,
                question_id,
                obtained,
                max,
            } => write!(
                f,
                "第 {} 页第 {} 题得分 {} 超过满分 {}",
                page + 1,
                question_id,
                obtained,
                max
            ),
            DataQualityIssue::BoxOutOfRange {
                page,
                question_id,
                box_2d,
            } => write!(
                f,
                "第 {} 页第 {} 题坐标框 {:?} 超出 0-1000 范围",
                page + 1,
                question_id,
                box_2d
            ),
        }
    }
}

/// grade_exam 的返回值
#[derive(Debug, Clone)]
pub struct GradingReport {
    /// 模型给出的批改结果（原样，不做修正）
    pub result: ExamGradingResult,
    /// 一致性检查发现的问题
    pub issues: Vec<DataQualityIssue>,
    /// 实际成功的模型
    pub model: String,
    /// 成功前失败的尝试
    pub failed_attempts: Vec<ModelAttempt>,
}

impl GradingReport {
    /// 除提示类问题外没有任何不一致
    pub fn is_consistent(&self) -> bool {
        self.issues.iter().all(DataQualityIssue::is_advisory)
    }
}
