pub mod config;
pub mod orchestrator;
pub mod providers;

pub use config::{create_provider, AiProviderConfig, AiServiceConfig, ProviderKind};
pub use orchestrator::{AiProvider, GenerateWordsOptions, WordProvider};
