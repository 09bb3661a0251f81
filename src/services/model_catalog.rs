//! 模型目录
//!
//! 每个提供方、每种任务一个有序的候选模型列表。
//! 列表来自 TOML 配置，调整顺序或替换下线的模型不需要改代码。

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::models::{ProviderKind, TaskKind};

const EMBEDDED_MODELS: &str = include_str!("../../assets/models.toml");

/// 单个提供方的候选列表
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskModels {
    #[serde(default)]
    pub grade_exam: Vec<String>,
    #[serde(default)]
    pub recognize_text: Vec<String>,
    #[serde(default)]
    pub solve_homework: Vec<String>,
    #[serde(default)]
    pub tutor_socratic: Vec<String>,
    #[serde(default)]
    pub essay_examples: Vec<String>,
}

impl TaskModels {
    fn for_task(&self, task: TaskKind) -> &[String] {
        match task {
            TaskKind::GradeExam => &self.grade_exam,
            TaskKind::RecognizeText => &self.recognize_text,
            TaskKind::SolveHomework => &self.solve_homework,
            TaskKind::TutorSocratic => &self.tutor_socratic,
            TaskKind::EssayExamples => &self.essay_examples,
        }
    }

    fn for_task_mut(&mut self, task: TaskKind) -> &mut Vec<String> {
        match task {
            TaskKind::GradeExam => &mut self.grade_exam,
            TaskKind::RecognizeText => &mut self.recognize_text,
            TaskKind::SolveHomework => &mut self.solve_homework,
            TaskKind::TutorSocratic => &mut self.tutor_socratic,
            TaskKind::EssayExamples => &mut self.essay_examples,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    providers: HashMap<ProviderKind, TaskModels>,
}

impl ModelCatalog {
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(EMBEDDED_MODELS, "assets/models.toml")
    }

    /// 有外部文件时使用外部文件，否则使用内置目录
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
        let raw: HashMap<String, TaskModels> =
            toml::from_str(content).map_err(|e| ConfigError::CatalogLoad {
                path: source.to_string(),
                reason: e.to_string(),
            })?;

        let mut providers = HashMap::new();
        for (name, models) in raw {
            match name.parse::<ProviderKind>() {
                Ok(kind) => {
                    providers.insert(kind, models);
                }
                Err(e) => warn!("⚠️ 模型目录 {} 中存在未知提供方: {}", source, e),
            }
        }

        debug!("已加载模型目录 {}，提供方: {} 个", source, providers.len());
        Ok(Self { providers })
    }

    /// 有序的候选模型，没有配置时为空
    pub fn candidates(&self, provider: ProviderKind, task: TaskKind) -> &[String] {
        self.providers
            .get(&provider)
            .map(|models| models.for_task(task))
            .unwrap_or(&[])
    }

    /// 运行时替换某个任务的候选列表
    pub fn set_candidates(&mut self, provider: ProviderKind, task: TaskKind, models: Vec<String>) {
        *self
            .providers
            .entry(provider)
            .or_default()
            .for_task_mut(task) = models;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_covers_every_task() {
        let catalog = ModelCatalog::embedded().unwrap();
        for provider in [ProviderKind::Google, ProviderKind::Qwen, ProviderKind::OpenAi] {
            for task in TaskKind::ALL {
                assert!(
                    !catalog.candidates(provider, task).is_empty(),
                    "{} / {} 没有候选模型",
                    provider,
                    task
                );
            }
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let catalog = ModelCatalog::embedded().unwrap();
        let models = catalog.candidates(ProviderKind::Google, TaskKind::GradeExam);
        assert_eq!(models[0], "gemini-2.0-flash-exp");
        assert_eq!(models.last().map(String::as_str), Some("gemini-1.5-pro"));
    }

    #[test]
    fn test_override_file_content() {
        let catalog = ModelCatalog::from_toml_str(
            "[qwen]\ngrade_exam = [\"qwen-vl-max\"]\n",
            "inline",
        )
        .unwrap();
        assert_eq!(
            catalog.candidates(ProviderKind::Qwen, TaskKind::GradeExam),
            ["qwen-vl-max".to_string()]
        );
        assert!(catalog
            .candidates(ProviderKind::Google, TaskKind::GradeExam)
            .is_empty());
    }

    #[test]
    fn test_unknown_task_is_rejected() {
        let err = ModelCatalog::from_toml_str("[google]\ngrade_essay = [\"x\"]\n", "inline")
            .unwrap_err();
        assert!(matches!(err, ConfigError::CatalogLoad { .. }));
    }

    #[test]
    fn test_set_candidates() {
        let mut catalog = ModelCatalog::default();
        catalog.set_candidates(
            ProviderKind::OpenAi,
            TaskKind::RecognizeText,
            vec!["local-vl".to_string()],
        );
        assert_eq!(
            catalog.candidates(ProviderKind::OpenAi, TaskKind::RecognizeText),
            ["local-vl".to_string()]
        );
    }

    #[test]
    fn test_missing_file_is_catalog_error() {
        let err = ModelCatalog::load(Some("/nonexistent/models.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::CatalogLoad { .. }));
    }
}
