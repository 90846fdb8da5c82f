//! Natural-language SQL agent.
//!
//! [`SqlAgent`] answers questions about a database by letting a chat model
//! call four database tools in a loop until it can reply in prose. History
//! is kept per thread in a [`ConversationStore`].

pub mod agent;
pub mod error;
pub mod prompt;
pub mod store;
pub mod tools;

pub use agent::{
    AgentResponse, DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL, DEFAULT_TOP_K, MAX_STEPS_MESSAGE,
    RunOutcome, SqlAgent,
};
pub use error::{AgentError, StoreError};
pub use prompt::{PromptContext, render_system_prompt};
pub use store::{ConversationStore, JsonDirStore, MemoryStore};
pub use tools::{SqlTool, dispatch, sql_tools};
