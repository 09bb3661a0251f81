pub mod grading;
pub mod image;
pub mod provider;
pub mod task;

pub use grading::{
    DataQualityIssue, EssayExamples, ErrorType, ExamGradingResult, ExamPage, GradingReport,
    Question, QuestionStatus,
};
pub use image::{ImageEncoding, ImagePayload, ImageProfile, PreparedImage, RawImage};
pub use provider::ProviderKind;
pub use task::{ModelAttempt, TaskKind};
