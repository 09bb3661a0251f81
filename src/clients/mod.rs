pub mod credentials;
pub mod gemini_client;
pub mod openai_client;
pub mod provider;
pub mod qwen_client;
pub mod transport;

pub use credentials::{ApiKey, CredentialStore, EnvCredentialStore, MemoryCredentialStore};
pub use gemini_client::GeminiClient;
pub use openai_client::OpenAiCompatibleClient;
pub use provider::{build_adapter, ProviderAdapter};
pub use qwen_client::QwenClient;
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};
