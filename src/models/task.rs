use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

/// 编排层支持的任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GradeExam,
    RecognizeText,
    SolveHomework,
    TutorSocratic,
    EssayExamples,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::GradeExam,
        TaskKind::RecognizeText,
        TaskKind::SolveHomework,
        TaskKind::TutorSocratic,
        TaskKind::EssayExamples,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::GradeExam => "grade_exam",
            TaskKind::RecognizeText => "recognize_text",
            TaskKind::SolveHomework => "solve_homework",
            TaskKind::TutorSocratic => "tutor_socratic",
            TaskKind::EssayExamples => "essay_examples",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次失败的模型调用记录
#[derive(Debug, Clone)]
pub struct ModelAttempt {
    pub model: String,
    pub error: UpstreamError,
    pub started_at: DateTime<Local>,
    pub elapsed_ms: u64,
}
