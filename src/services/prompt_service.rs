//! 提示词服务 - 业务能力层
//!
//! 只负责"把任务参数变成提示词文本"，不关心由哪个提供方发送。
//! 模板放在带版本号的 TOML 里，措辞调整不需要改代码。

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::TaskKind;

const EMBEDDED_PROMPTS: &str = include_str!("../../assets/prompts.toml");

const DEFAULT_HOMEWORK_INSTRUCTION: &str =
    "Solve this problem step-by-step and explain the concepts.";

/// 各任务的提示词参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskPrompt<'a> {
    GradeExam {
        total_max_score: f64,
        page_count: usize,
    },
    RecognizeText,
    SolveHomework {
        instruction: Option<&'a str>,
    },
    TutorSocratic {
        question: &'a str,
        student_answer: Option<&'a str>,
    },
    EssayExamples {
        topic: &'a str,
    },
}

impl TaskPrompt<'_> {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPrompt::GradeExam { .. } => TaskKind::GradeExam,
            TaskPrompt::RecognizeText => TaskKind::RecognizeText,
            TaskPrompt::SolveHomework { .. } => TaskKind::SolveHomework,
            TaskPrompt::TutorSocratic { .. } => TaskKind::TutorSocratic,
            TaskPrompt::EssayExamples { .. } => TaskKind::EssayExamples,
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match *self {
            TaskPrompt::GradeExam {
                total_max_score,
                page_count,
            } => vec![
                ("total_max_score", total_max_score.to_string()),
                ("page_count", page_count.to_string()),
            ],
            TaskPrompt::RecognizeText => Vec::new(),
            TaskPrompt::SolveHomework { instruction } => vec![(
                "instruction",
                instruction
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_HOMEWORK_INSTRUCTION)
                    .to_string(),
            )],
            TaskPrompt::TutorSocratic {
                question,
                student_answer,
            } => vec![
                ("question", question.trim().to_string()),
                (
                    "student_answer_line",
                    student_answer
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|a| format!("Their answer is: \"{}\"", a))
                        .unwrap_or_default(),
                ),
            ],
            TaskPrompt::EssayExamples { topic } => vec![("topic", topic.trim().to_string())],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PromptTemplate {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PromptCatalog {
    version: String,
    templates: HashMap<String, PromptTemplate>,
}

/// 提示词构建器
///
/// 纯函数：相同的参数总是得到相同的文本。
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    catalog: PromptCatalog,
}

impl PromptBuilder {
    /// 使用内置模板
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(EMBEDDED_PROMPTS, "assets/prompts.toml")
    }

    /// 有外部文件时使用外部文件，否则使用内置模板
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogLoad {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?;
                Self::from_toml_str(&content, path)
            }
            None => Self::embedded(),
        }
    }

    pub fn from_toml_str(content: &str, source: &str) -> Result<Self, ConfigError> {
        let catalog: PromptCatalog =
            toml::from_str(content).map_err(|e| ConfigError::CatalogLoad {
                path: source.to_string(),
                reason: e.to_string(),
            })?;

        for task in TaskKind::ALL {
            if !catalog.templates.contains_key(task.as_str()) {
                return Err(ConfigError::PromptTemplate {
                    task: task.to_string(),
                    reason: format!("{} 中缺少该任务的模板", source),
                });
            }
        }

        Ok(Self { catalog })
    }

    /// 模板版本号，用于日志和排查
    pub fn version(&self) -> &str {
        &self.catalog.version
    }

    pub fn build(&self, prompt: &TaskPrompt<'_>) -> Result<String, ConfigError> {
        let task = prompt.kind();
        let template = self
            .catalog
            .templates
            .get(task.as_str())
            .ok_or_else(|| ConfigError::PromptTemplate {
                task: task.to_string(),
                reason: "模板不存在".to_string(),
            })?;

        render(template.text.trim(), &prompt.params()).map_err(|reason| {
            ConfigError::PromptTemplate {
                task: task.to_string(),
                reason,
            }
        })
    }
}

/// 单遍替换 `{{name}}`，参数值中的花括号不会被再次解析
fn render(template: &str, params: &[(&'static str, String)]) -> Result<String, String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| "占位符缺少结束标记 }}".to_string())?;
        let name = after[..end].trim();
        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| format!("缺少参数 {}", name))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}
