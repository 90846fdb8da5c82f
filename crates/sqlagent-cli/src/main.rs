mod config;
mod registry;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use config::{AppConfig, ConfigError, ConfigOverrides, DEFAULT_CONFIG_FILE};
use registry::{
    RunContext, RunPaths, Transcript, init_logging, init_run_logging, start_run, write_transcript,
};
use sqlagent_agent::{AgentError, ConversationStore, JsonDirStore, MemoryStore, SqlAgent};
use sqlagent_core::{ConnectionTarget, Error as CoreError, redact_connection_string};
use sqlagent_db::SqlDatabase;
use sqlagent_llm::{LlmError, OpenAiClient, OpenAiConfig};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "sqlagent",
    version,
    about = "Ask questions about a SQL database in plain language"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Config file (defaults to ./sqlagent.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Database connection string, e.g. sqlite:///chinook.db.
    #[arg(
        long,
        global = true,
        env = "SQLAGENT_DATABASE_URL",
        value_name = "CONNECTION_STRING"
    )]
    database: Option<String>,
    /// Chat model name.
    #[arg(long, global = true)]
    model: Option<String>,
    /// Model calls allowed per question.
    #[arg(long, global = true)]
    max_iterations: Option<u32>,
    /// Reject statements that modify data.
    #[arg(long, global = true, default_value_t = false)]
    read_only: bool,
    /// Output directory for runs.
    #[arg(long, global = true)]
    run_dir: Option<PathBuf>,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database: self.database.clone(),
            model: self.model.clone(),
            max_iterations: self.max_iterations,
            read_only: self.read_only,
            run_dir: self.run_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a single question.
    Ask(AskArgs),
    /// Answer questions read from stdin, one per line.
    Chat(ChatArgs),
    /// List the tables in the database.
    Tables,
    /// Describe tables with sample rows.
    Schema {
        /// Comma-separated table names.
        tables: String,
    },
    /// Check a query's syntax without running it.
    Check { sql: String },
    /// Run a query and print the result.
    Query { sql: String },
    /// Write a config file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct AskArgs {
    question: String,
    /// Conversation thread to continue (a new one when omitted).
    #[arg(long)]
    thread: Option<String>,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Conversation thread to continue (a new one when omitted).
    #[arg(long)]
    thread: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { force } => run_init(&cli.global, force),
        Command::Ask(args) => run_ask(&load_config(&cli.global)?, args).await,
        Command::Chat(args) => run_chat(&load_config(&cli.global)?, args).await,
        Command::Tables => {
            let db = connect_for_tools(&load_config(&cli.global)?).await?;
            println!("{}", db.list_tables().await);
            Ok(())
        }
        Command::Schema { tables } => {
            let db = connect_for_tools(&load_config(&cli.global)?).await?;
            println!("{}", db.schema(&tables).await);
            Ok(())
        }
        Command::Check { sql } => {
            let db = connect_for_tools(&load_config(&cli.global)?).await?;
            println!("{}", db.check_query(&sql));
            Ok(())
        }
        Command::Query { sql } => {
            let db = connect_for_tools(&load_config(&cli.global)?).await?;
            println!("{}", db.run_query(&sql).await);
            Ok(())
        }
    }
}

fn load_config(global: &GlobalArgs) -> Result<AppConfig, CliError> {
    let mut config = AppConfig::load(global.config.as_deref())?;
    config.apply(global.overrides());
    Ok(config)
}

fn run_init(global: &GlobalArgs, force: bool) -> Result<(), CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if path.exists() && !force {
        return Err(CliError::InvalidConfig(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }

    let mut config = AppConfig::default();
    config.apply(global.overrides());
    std::fs::write(&path, config.to_toml()?)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn connect_for_tools(config: &AppConfig) -> Result<SqlDatabase, CliError> {
    init_logging(&config.logging.level)?;
    let url = config.database_url()?;
    Ok(SqlDatabase::connect_with(url, config.database_options()).await?)
}

/// A run directory, its logging, and the agent answering on one thread.
struct Session {
    agent: SqlAgent,
    paths: RunPaths,
    transcript: Transcript,
    started: Instant,
}

impl Session {
    async fn open(
        config: &AppConfig,
        command: &'static str,
        thread: Option<String>,
    ) -> Result<Self, CliError> {
        let url = config.database_url()?;
        let engine = ConnectionTarget::parse(url)?.engine();
        let thread_id = thread.unwrap_or_else(|| Uuid::new_v4().to_string());

        let run_ctx = RunContext {
            run_id: Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
            command,
            engine: engine.to_string(),
            model: config.llm.model.clone(),
            thread_id: thread_id.clone(),
            max_iterations: config.agent.max_iterations,
            read_only: config.database.read_only,
            run_dir: config.logging.run_dir.clone(),
            connection: redact_connection_string(url),
        };

        let paths = start_run(&run_ctx)?;
        init_run_logging(&paths.logs_path, &config.logging.level)?;

        tracing::info!(
            event = "run_started",
            run_id = %run_ctx.run_id,
            command,
            engine = %engine,
            thread_id = %thread_id,
        );

        let db = SqlDatabase::connect_with(url, config.database_options()).await?;
        let client = build_client(config)?;

        let store: Arc<dyn ConversationStore> = match &config.agent.conversations_dir {
            Some(dir) => Arc::new(JsonDirStore::new(dir.clone())),
            None => MemoryStore::shared(),
        };

        let agent = SqlAgent::new(Arc::new(db), thread_id, Arc::new(client))
            .with_model(config.llm.model.clone())
            .with_max_iterations(config.agent.max_iterations)
            .with_temperature(config.llm.temperature)
            .with_top_k(config.agent.top_k)
            .with_store(store);

        Ok(Self {
            agent,
            transcript: Transcript::new(&run_ctx),
            paths,
            started: Instant::now(),
        })
    }

    async fn ask(&mut self, question: &str) -> Result<String, CliError> {
        let response = self.agent.run(question).await?;
        self.transcript.record(question, &response);
        write_transcript(&self.paths, &self.transcript)?;
        Ok(response.response)
    }

    fn finish(self) {
        tracing::info!(
            event = "run_finished",
            status = "success",
            turns = self.transcript.turns.len(),
            duration_ms = self.started.elapsed().as_millis(),
            run_dir = %self.paths.root.display(),
        );
    }
}

fn build_client(config: &AppConfig) -> Result<OpenAiClient, CliError> {
    let mut llm = OpenAiConfig::from_env()?;
    if let Some(base_url) = &config.llm.base_url {
        llm.base_url = base_url.clone();
    }
    llm.timeout = Duration::from_secs(config.llm.timeout_secs);
    Ok(OpenAiClient::new(llm)?)
}

async fn run_ask(config: &AppConfig, args: AskArgs) -> Result<(), CliError> {
    let mut session = Session::open(config, "ask", args.thread).await?;
    let answer = session.ask(&args.question).await?;
    println!("{answer}");
    session.finish();
    Ok(())
}

async fn run_chat(config: &AppConfig, args: ChatArgs) -> Result<(), CliError> {
    let mut session = Session::open(config, "chat", args.thread).await?;
    eprintln!(
        "thread {} (blank line, exit or quit to stop)",
        session.agent.thread_id()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() || matches!(question, "exit" | "quit") {
            break;
        }

        let answer = session.ask(question).await?;
        println!("{answer}\n");
    }

    session.finish();
    Ok(())
}
