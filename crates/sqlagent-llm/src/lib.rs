//! Chat-completion plumbing for the SQL agent.
//!
//! Messages and tool calls use the OpenAI chat wire shape so a conversation
//! history can be sent back to the API unchanged.

pub mod error;
pub mod message;
pub mod openai;
pub mod provider;

pub use error::LlmError;
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use openai::{DEFAULT_BASE_URL, OpenAiClient, OpenAiConfig};
pub use provider::{ChatCompletion, ChatModel, ChatRequest, TokenUsage, ToolDefinition};
