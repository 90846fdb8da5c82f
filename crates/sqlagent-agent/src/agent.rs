use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sqlagent_db::SqlDatabase;
use sqlagent_llm::{ChatModel, ChatRequest, Message, OpenAiClient};

use crate::error::AgentError;
use crate::prompt::{PromptContext, render_system_prompt};
use crate::store::{ConversationStore, MemoryStore};
use crate::tools::{dispatch, sql_tools};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TOP_K: u32 = 5;
pub const MAX_STEPS_MESSAGE: &str = "I've reached the maximum number of steps while processing your query. Please try rephrasing your question or breaking it into smaller parts.";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Answered,
    ModelError,
    MaxIterations,
}

/// Final reply of a run plus the thread history as persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub response: String,
    pub history: Vec<Message>,
    pub outcome: RunOutcome,
    /// Model calls made during the run.
    pub iterations: u32,
}

impl fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}

/// Answers questions about one database on one conversation thread.
pub struct SqlAgent {
    db: Arc<SqlDatabase>,
    thread_id: String,
    model: String,
    client: Arc<dyn ChatModel>,
    store: Arc<dyn ConversationStore>,
    max_iterations: u32,
    temperature: Option<f32>,
    top_k: u32,
}

impl fmt::Debug for SqlAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlAgent")
            .field("db", &self.db)
            .field("thread_id", &self.thread_id)
            .field("model", &self.model)
            .field("max_iterations", &self.max_iterations)
            .field("temperature", &self.temperature)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl SqlAgent {
    pub fn new(
        db: Arc<SqlDatabase>,
        thread_id: impl Into<String>,
        client: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            db,
            thread_id: thread_id.into(),
            model: DEFAULT_MODEL.to_string(),
            client,
            store: MemoryStore::shared(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            temperature: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Agent backed by an OpenAI client configured from `OPENAI_API_KEY`
    /// and `OPENAI_BASE_URL`.
    pub fn from_env(
        db: Arc<SqlDatabase>,
        thread_id: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let client = OpenAiClient::from_env()?;
        Ok(Self::new(db, thread_id, Arc::new(client)))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> String {
        render_system_prompt(&PromptContext {
            dialect: self.db.engine().dialect_name().to_string(),
            top_k: self.top_k,
            read_only: self.db.options().access.is_read_only(),
        })
    }

    /// Answer `question`, letting the model call database tools until it
    /// replies in prose or the iteration budget runs out.
    ///
    /// Model failures end the run with an apology reply rather than an
    /// error; only conversation store failures are returned as `Err`.
    pub async fn run(&self, question: &str) -> Result<AgentResponse, AgentError> {
        let mut messages = self.store.load(&self.thread_id)?;
        if messages.is_empty() {
            messages.push(Message::system(self.system_prompt()));
        }
        messages.push(Message::user(question));

        tracing::info!(
            event = "agent_run_started",
            thread_id = %self.thread_id,
            model = %self.model,
            history_len = messages.len(),
        );

        let tools = sql_tools();
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;

            let request = ChatRequest::new(self.model.clone(), messages.clone())
                .with_tools(tools.clone())
                .with_temperature(self.temperature);

            let completion = match self.client.complete(&request).await {
                Ok(completion) => completion,
                Err(err) => {
                    tracing::warn!(
                        event = "agent_model_error",
                        thread_id = %self.thread_id,
                        iteration = iterations,
                        error = %err,
                    );
                    let reply =
                        format!("I encountered an error while processing your query: {err}");
                    return self.finish(messages, reply, RunOutcome::ModelError, iterations);
                }
            };

            if completion.tool_calls.is_empty() {
                match completion.text() {
                    Some(text) => {
                        let reply = text.to_string();
                        return self.finish(messages, reply, RunOutcome::Answered, iterations);
                    }
                    None => {
                        tracing::debug!(
                            event = "empty_completion",
                            thread_id = %self.thread_id,
                            iteration = iterations,
                        );
                        continue;
                    }
                }
            }

            let calls = completion.tool_calls;
            messages.push(Message::assistant_tool_calls(calls.clone()));
            for call in &calls {
                tracing::info!(
                    event = "tool_call",
                    thread_id = %self.thread_id,
                    tool = %call.function.name,
                    arguments = %call.function.arguments,
                );
                let result =
                    dispatch(&self.db, &call.function.name, &call.function.arguments).await;
                tracing::debug!(
                    event = "tool_result",
                    thread_id = %self.thread_id,
                    tool = %call.function.name,
                    result_len = result.len(),
                );
                messages.push(Message::tool_result(call.id.clone(), result));
            }
        }

        self.finish(
            messages,
            MAX_STEPS_MESSAGE.to_string(),
            RunOutcome::MaxIterations,
            iterations,
        )
    }

    fn finish(
        &self,
        mut messages: Vec<Message>,
        reply: String,
        outcome: RunOutcome,
        iterations: u32,
    ) -> Result<AgentResponse, AgentError> {
        messages.push(Message::assistant(reply.clone()));
        self.store.save(&self.thread_id, &messages)?;

        tracing::info!(
            event = "agent_run_finished",
            thread_id = %self.thread_id,
            outcome = ?outcome,
            iterations,
            history_len = messages.len(),
        );

        Ok(AgentResponse {
            response: reply,
            history: messages,
            outcome,
            iterations,
        })
    }
}
