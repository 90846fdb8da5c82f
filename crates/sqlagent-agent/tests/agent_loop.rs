use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use sqlagent_agent::{
    ConversationStore, JsonDirStore, MAX_STEPS_MESSAGE, MemoryStore, RunOutcome, SqlAgent,
};
use sqlagent_db::SqlDatabase;
use sqlagent_llm::{
    ChatCompletion, ChatModel, ChatRequest, LlmError, Message, Role, ToolCall,
};

/// Replays canned completions and records every request it receives.
/// Once the script is exhausted it returns empty turns.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ChatCompletion, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<ChatCompletion, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatCompletion::default()))
    }
}

fn answer(text: &str) -> Result<ChatCompletion, LlmError> {
    Ok(ChatCompletion {
        content: Some(text.to_string()),
        ..ChatCompletion::default()
    })
}

fn calls(calls: Vec<ToolCall>) -> Result<ChatCompletion, LlmError> {
    Ok(ChatCompletion {
        tool_calls: calls,
        ..ChatCompletion::default()
    })
}

async fn music_db() -> Result<Arc<SqlDatabase>> {
    let db = SqlDatabase::connect("sqlite::memory:").await?;
    for statement in [
        "CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT)",
        "INSERT INTO Artist (ArtistId, Name) VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith')",
    ] {
        let outcome = db.run_query(statement).await;
        assert!(outcome.starts_with("Query executed successfully."), "{outcome}");
    }
    Ok(Arc::new(db))
}

fn agent(
    db: Arc<SqlDatabase>,
    model: Arc<ScriptedModel>,
    store: Arc<dyn ConversationStore>,
) -> SqlAgent {
    SqlAgent::new(db, "thread-1", model).with_store(store)
}

#[tokio::test]
async fn answers_after_running_tools() -> Result<()> {
    let db = music_db().await?;
    let model = ScriptedModel::new(vec![
        calls(vec![ToolCall::function("call_1", "sql_db_list_tables", "{}")]),
        calls(vec![
            ToolCall::function("call_2", "sql_db_query_checker", r#"{"query": "SELECT COUNT(*) AS n FROM Artist"}"#),
            ToolCall::function("call_3", "sql_db_query", r#"{"query": "SELECT COUNT(*) AS n FROM Artist"}"#),
        ]),
        answer("There are 3 artists."),
    ]);
    let agent = agent(db, model.clone(), Arc::new(MemoryStore::new()));

    let response = agent.run("How many artists are there?").await?;
    assert_eq!(response.to_string(), "There are 3 artists.");
    assert_eq!(response.outcome, RunOutcome::Answered);
    assert_eq!(response.iterations, 3);

    let roles: Vec<Role> = response.history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            Role::System,
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::Assistant,
        ]
    );
    assert_eq!(response.history[3].content.as_deref(), Some("Artist"));
    assert_eq!(response.history[3].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(
        response.history[5].content.as_deref(),
        Some("✓ Query syntax is valid.")
    );
    assert_eq!(response.history[6].content.as_deref(), Some("n\n-\n3"));

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].model, "gpt-4.1-mini");
    assert_eq!(requests[0].tools.len(), 4);
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[2].messages.len(), 7);
    Ok(())
}

#[tokio::test]
async fn system_prompt_names_dialect_and_is_written_once() -> Result<()> {
    let db = music_db().await?;
    let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
    let model = ScriptedModel::new(vec![answer("Hello."), answer("Still here.")]);
    let agent = agent(db, model.clone(), store.clone());

    agent.run("hi").await?;
    let second = agent.run("are you there?").await?;

    let systems = second
        .history
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(systems, 1);
    let prompt = second.history[0].content.as_deref().unwrap_or_default();
    assert!(prompt.contains("SQLite"));
    assert_eq!(second.history.len(), 5);
    assert_eq!(store.load("thread-1")?, second.history);

    // The second request carries the first exchange.
    let requests = model.requests();
    assert_eq!(requests[1].messages[2], Message::assistant("Hello."));
    Ok(())
}

#[tokio::test]
async fn threads_do_not_share_history() -> Result<()> {
    let db = music_db().await?;
    let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
    let model = ScriptedModel::new(vec![answer("one"), answer("two")]);

    SqlAgent::new(db.clone(), "a", model.clone())
        .with_store(store.clone())
        .run("first")
        .await?;
    let other = SqlAgent::new(db, "b", model)
        .with_store(store.clone())
        .run("second")
        .await?;

    assert_eq!(other.history.len(), 3);
    assert_eq!(store.load("a")?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn model_failure_becomes_the_reply() -> Result<()> {
    let db = music_db().await?;
    let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
    let model = ScriptedModel::new(vec![Err(LlmError::Api {
        status: 500,
        body: "upstream unavailable".to_string(),
    })]);
    let agent = agent(db, model, store.clone());

    let response = agent.run("How many artists?").await?;
    assert_eq!(
        response.response,
        "I encountered an error while processing your query: API error 500: upstream unavailable"
    );
    assert_eq!(response.outcome, RunOutcome::ModelError);
    assert_eq!(store.load("thread-1")?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn stops_after_max_iterations() -> Result<()> {
    let db = music_db().await?;
    let replies = (0..5)
        .map(|i| {
            calls(vec![ToolCall::function(
                format!("call_{i}"),
                "sql_db_list_tables",
                "",
            )])
        })
        .collect();
    let model = ScriptedModel::new(replies);
    let agent = agent(db, model.clone(), Arc::new(MemoryStore::new())).with_max_iterations(3);

    let response = agent.run("loop forever").await?;
    assert_eq!(response.response, MAX_STEPS_MESSAGE);
    assert_eq!(response.outcome, RunOutcome::MaxIterations);
    assert_eq!(response.iterations, 3);
    assert_eq!(model.requests().len(), 3);
    // system, user, 3 x (assistant + tool), final reply
    assert_eq!(response.history.len(), 9);
    Ok(())
}

#[tokio::test]
async fn empty_turns_use_up_the_budget() -> Result<()> {
    let db = music_db().await?;
    let model = ScriptedModel::new(vec![answer("")]);
    let agent = agent(db, model.clone(), Arc::new(MemoryStore::new())).with_max_iterations(2);

    let response = agent.run("say nothing").await?;
    assert_eq!(response.outcome, RunOutcome::MaxIterations);
    assert_eq!(model.requests().len(), 2);
    assert_eq!(response.history.len(), 3);
    Ok(())
}

#[tokio::test]
async fn whitespace_only_content_is_still_an_answer() -> Result<()> {
    let db = music_db().await?;
    let model = ScriptedModel::new(vec![answer(" \n")]);
    let agent = agent(db, model.clone(), Arc::new(MemoryStore::new()));

    let response = agent.run("say something").await?;
    assert_eq!(response.outcome, RunOutcome::Answered);
    assert_eq!(response.response, " \n");
    assert_eq!(model.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_tools_and_bad_arguments_are_reported_to_the_model() -> Result<()> {
    let db = music_db().await?;
    let model = ScriptedModel::new(vec![
        calls(vec![
            ToolCall::function("call_1", "drop_database", "{}"),
            ToolCall::function("call_2", "sql_db_query", "{not json"),
            ToolCall::function("call_3", "sql_db_schema", r#"{"tables": "Artist, Missing"}"#),
        ]),
        answer("Done."),
    ]);
    let agent = agent(db, model, Arc::new(MemoryStore::new()));

    let response = agent.run("break things").await?;
    assert_eq!(response.outcome, RunOutcome::Answered);

    let results: Vec<&str> = response
        .history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], "Unknown function: drop_database");
    assert!(
        results[1].starts_with("Error: invalid arguments for sql_db_query:"),
        "{}",
        results[1]
    );
    assert!(results[2].contains("Table: Artist"), "{}", results[2]);
    assert!(
        results[2].contains("Table 'Missing' does not exist."),
        "{}",
        results[2]
    );
    Ok(())
}

#[tokio::test]
async fn json_dir_store_resumes_a_thread() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = music_db().await?;
    let model = ScriptedModel::new(vec![answer("first answer"), answer("second answer")]);

    let store: Arc<dyn ConversationStore> = Arc::new(JsonDirStore::new(dir.path()));
    agent(db.clone(), model.clone(), store).run("first").await?;

    let reopened: Arc<dyn ConversationStore> = Arc::new(JsonDirStore::new(dir.path()));
    let response = agent(db, model, reopened).run("second").await?;

    assert_eq!(response.history.len(), 5);
    assert_eq!(response.history[2], Message::assistant("first answer"));
    assert!(JsonDirStore::new(dir.path()).thread_path("thread-1").exists());
    Ok(())
}
