//! Devtwin LLM — provider adapters behind one chat-completion trait
//!
//! The tool loop only sees `ChatMessage`/`ChatResponse`; provider-specific
//! content shapes are coerced to canonical strings at this boundary.

pub mod anthropic;
pub mod factory;
pub mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use factory::make_provider;
pub use openai::OpenAiCompatProvider;
pub use provider::{LlmError, LlmProvider, LlmResult};
pub use types::*;
