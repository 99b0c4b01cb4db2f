// LLM abstraction layer

pub mod provider;
pub(crate) mod http;
pub mod openai;
pub mod anthropic;
pub mod google;
pub mod local;
pub mod rate_limit;
pub mod orchestrator;

pub use orchestrator::ProviderOrchestrator;
pub use provider::*;
pub use rate_limit::GenerationRateLimiter;
