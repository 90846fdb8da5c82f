use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sqlagent_agent::{AgentResponse, RunOutcome};
use sqlagent_core::RedactedConnection;
use sqlagent_llm::Message;

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: &'static str,
    pub engine: String,
    pub model: String,
    pub thread_id: String,
    pub max_iterations: u32,
    pub read_only: bool,
    pub run_dir: PathBuf,
    pub connection: RedactedConnection,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub command: String,
    pub engine: String,
    pub model: String,
    pub thread_id: String,
    pub max_iterations: u32,
    pub read_only: bool,
    pub connection: RedactedConnection,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub transcript_path: PathBuf,
}

/// One question and how the agent answered it.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub question: String,
    pub response: String,
    pub outcome: RunOutcome,
    pub iterations: u32,
    pub finished_at: String,
}

/// Everything said on the thread during this run.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub run_id: String,
    pub thread_id: String,
    pub turns: Vec<TurnRecord>,
    pub history: Vec<Message>,
}

impl Transcript {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            thread_id: ctx.thread_id.clone(),
            turns: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn record(&mut self, question: &str, response: &AgentResponse) {
        self.turns.push(TurnRecord {
            question: question.to_string(),
            response: response.response.clone(),
            outcome: response.outcome,
            iterations: response.iterations,
            finished_at: Utc::now().to_rfc3339(),
        });
        self.history = response.history.clone();
    }
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");
    let transcript_path = root.join("transcript.json");

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        command: ctx.command.to_string(),
        engine: ctx.engine.clone(),
        model: ctx.model.clone(),
        thread_id: ctx.thread_id.clone(),
        max_iterations: ctx.max_iterations,
        read_only: ctx.read_only,
        connection: ctx.connection.clone(),
        git: collect_git_info(),
    };

    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        logs_path,
        transcript_path,
    })
}

/// Rewritten after every turn so an interrupted chat keeps what it had.
pub fn write_transcript(paths: &RunPaths, transcript: &Transcript) -> RegistryResult<()> {
    write_json(&paths.transcript_path, transcript)
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
