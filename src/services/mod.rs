pub mod extract_service;
pub mod image_service;
pub mod model_catalog;
pub mod prompt_service;
pub mod validation_service;

pub use extract_service::extract_json;
pub use image_service::ImagePreprocessor;
pub use model_catalog::ModelCatalog;
pub use prompt_service::{PromptBuilder, TaskPrompt};
pub use validation_service::{check_consistency, validate_essay, validate_grading};
