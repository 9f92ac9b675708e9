//! CLI entry point for chatlog

mod repl;

use anyhow::{Context, Result};
use chatlog_agent::{ChatEvent, Conversation, TurnError, TurnReport};
use chatlog_core::config::validate::validate_config;
use chatlog_core::config::{BackendKind, Config, ConfigLoader, LoggingConfig};
use chatlog_core::history::{self, ChatHistory, HistoryManager, Message, Role};
use chatlog_core::logging::init_logging;
use chatlog_providers::{client_from_config, CompletionService, ProviderRegistry};
use clap::{Args, Parser, Subcommand};
use console::style;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::repl::ReplCommand;

#[derive(Parser)]
#[command(name = "chatlog")]
#[command(about = "Chat with a language model and keep the conversation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question without history
    Ask {
        /// The question
        #[arg(required = true)]
        prompt: Vec<String>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Start an interactive chat that remembers the conversation
    Chat {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        history: HistoryArgs,
        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Inspect or clear a stored conversation
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Show status information
    Status,
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Print the stored messages of a session
    Show {
        #[command(flatten)]
        history: HistoryArgs,
        /// Only print the last N messages
        #[arg(short, long)]
        last: Option<usize>,
    },
    /// Delete every message of a session
    Clear {
        #[command(flatten)]
        history: HistoryArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct ModelArgs {
    /// Provider to use (ollama, gemini, openai, groq)
    #[arg(short, long)]
    provider: Option<String>,
    /// Model to use; picks its provider when --provider is not given
    #[arg(short, long)]
    model: Option<String>,
}

impl ModelArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model.model = model.clone();
            if self.provider.is_none() {
                if let Some(spec) = ProviderRegistry::new().find_by_model(model) {
                    config.model.provider = spec.name.clone();
                }
            }
        }
        if let Some(provider) = &self.provider {
            config.model.provider = provider.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct HistoryArgs {
    /// Session identifier
    #[arg(short, long)]
    session: Option<String>,
    /// History store (none, memory, redis, supabase)
    #[arg(short, long)]
    backend: Option<BackendKind>,
}

impl HistoryArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(session) = &self.session {
            config.history.session_id = session.clone();
        }
        if let Some(backend) = self.backend {
            config.history.backend = backend;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("Failed to load configuration")?;
    let _log_guard = init_logging(&logging_config(&loader, &config.logging))?;

    match cli.command {
        Commands::Ask { prompt, model } => {
            model.apply(&mut config);
            validate_config(&config)?;
            run_ask(&config, &prompt.join(" ")).await?;
        }
        Commands::Chat {
            model,
            history,
            stream,
        } => {
            model.apply(&mut config);
            history.apply(&mut config);
            validate_config(&config)?;
            info!("Starting chat in session {}", config.history.session_id);
            run_chat(&config, stream || config.model.stream).await?;
        }
        Commands::History { command } => match command {
            HistoryCommands::Show { history, last } => {
                history.apply(&mut config);
                validate_config(&config)?;
                run_history_show(&config, last).await?;
            }
            HistoryCommands::Clear { history } => {
                history.apply(&mut config);
                validate_config(&config)?;
                run_history_clear(&config).await?;
            }
        },
        Commands::Status => run_status(&loader, &config).await?,
    }

    Ok(())
}

/// Log files live under the config directory unless an absolute path is configured
fn logging_config(loader: &ConfigLoader, logging: &LoggingConfig) -> LoggingConfig {
    let mut logging = logging.clone();
    if Path::new(&logging.dir).is_relative() {
        logging.dir = loader
            .config_dir()
            .join(&logging.dir)
            .to_string_lossy()
            .into_owned();
    }
    logging
}

fn build_conversation(config: &Config) -> Result<Conversation> {
    let client = client_from_config(config)?;
    info!(
        "Using {} at {} (model: {})",
        config.model.provider,
        client.api_base(),
        client.default_model()
    );

    let mut conversation = Conversation::new(Arc::new(client));
    if let Some(prompt) = &config.model.system_prompt {
        conversation = conversation.with_system_prompt(prompt.clone());
    }
    Ok(conversation)
}

async fn open_history(config: &Config) -> Result<ChatHistory> {
    let backend = history::connect(&config.history)
        .await
        .with_context(|| format!("History store '{}' is unavailable", config.history.backend))?;
    let history = ChatHistory::open(
        config.history.session_id.clone(),
        backend,
        config.history.durability,
    )
    .await
    .with_context(|| format!("Failed to load session {}", config.history.session_id))?;
    report_skipped(&history);
    Ok(history)
}

fn report_skipped(history: &ChatHistory) {
    for skipped in history.skipped_records() {
        println!(
            "{} record {} could not be read: {}",
            style("warning:").yellow(),
            skipped.index,
            skipped.reason
        );
    }
}

async fn run_ask(config: &Config, prompt: &str) -> Result<()> {
    let conversation = build_conversation(config)?;

    let mut messages = Vec::new();
    if let Some(system) = &config.model.system_prompt {
        messages.push(Message::system(system.clone()));
    }
    messages.push(Message::human(prompt));

    match conversation.ask(&messages).await {
        Ok(completion) => {
            println!("{}", completion.content);
            Ok(())
        }
        Err(e) => {
            error!("Completion failed: {}", e);
            anyhow::bail!("Failed to get a reply: {}", e);
        }
    }
}

async fn run_chat(config: &Config, stream: bool) -> Result<()> {
    let backend = history::connect(&config.history)
        .await
        .with_context(|| format!("History store '{}' is unavailable", config.history.backend))?;
    let manager = HistoryManager::new(backend, config.history.durability);
    let shared = manager
        .open(&config.history.session_id)
        .await
        .with_context(|| format!("Failed to load session {}", config.history.session_id))?;
    let mut guard = shared.lock().await;
    let history: &mut ChatHistory = &mut guard;

    let conversation = build_conversation(config)?;

    println!(
        "{} session {} on {} ({} messages loaded)",
        style("chatlog").bold().cyan(),
        style(history.session_id()).bold(),
        history.backend_name(),
        history.len()
    );
    report_skipped(history);
    println!("Type 'exit' to quit, 'clear' to erase the history, 'stream' to toggle streaming.\n");

    let mut interrupts = watch_interrupts();
    run_repl(
        &conversation,
        history,
        BufReader::new(tokio::io::stdin()),
        &mut interrupts,
        stream,
    )
    .await
}

/// Forward every Ctrl-C for the rest of the process.
///
/// Installed once: after the first `ctrl_c()` registration SIGINT no longer
/// terminates the process, so the REPL has to act on each one itself.
fn watch_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read lines until `exit`, end of input, or an interrupt at the prompt.
/// An interrupt while a reply is pending abandons that turn only.
async fn run_repl<R>(
    conversation: &Conversation,
    history: &mut ChatHistory,
    input: R,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    stream: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut stream_mode = stream;
    let mut lines = input.lines();

    loop {
        print!("{} ", style("You:").bold().green());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Exit => break,
            ReplCommand::Empty => continue,
            ReplCommand::Clear => match history.clear().await {
                Ok(()) => println!("{}", style("History cleared.").dim()),
                Err(e) => println!(
                    "{} cleared locally, but the store kept its copy: {}",
                    style("warning:").yellow(),
                    e
                ),
            },
            ReplCommand::ToggleStream => {
                stream_mode = !stream_mode;
                let state = if stream_mode { "on" } else { "off" };
                println!("{}", style(format!("Streaming {}", state)).dim());
            }
            ReplCommand::Say(input) => {
                let result = if stream_mode {
                    let cancel = CancellationToken::new();
                    let turn = stream_turn(conversation, &mut *history, &input, &cancel);
                    tokio::pin!(turn);
                    tokio::select! {
                        result = &mut turn => result,
                        Some(()) = interrupts.recv() => {
                            cancel.cancel();
                            turn.await
                        }
                    }
                } else {
                    tokio::select! {
                        result = conversation.send(&mut *history, &input) => {
                            result.inspect(|report| {
                                println!("{} {}", style("AI:").bold().cyan(), report.reply);
                            })
                        }
                        Some(()) = interrupts.recv() => Err(TurnError::Cancelled),
                    }
                };

                match result {
                    Ok(report) => {
                        for failure in &report.write_failures {
                            println!("{} not saved: {}", style("warning:").yellow(), failure);
                        }
                    }
                    Err(TurnError::Cancelled) => println!("{}", style("(cancelled)").dim()),
                    Err(e) => {
                        error!("Turn failed: {}", e);
                        println!("{} {}", style("Error:").red(), e);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Stream one reply to stdout until it completes or `cancel` fires
async fn stream_turn(
    conversation: &Conversation,
    history: &mut ChatHistory,
    input: &str,
    cancel: &CancellationToken,
) -> Result<TurnReport, TurnError> {
    print!("{} ", style("AI:").bold().cyan());
    let _ = std::io::stdout().flush();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let turn = async {
        let tx = tx;
        conversation
            .send_streaming(history, input, Some(&tx), cancel)
            .await
    };
    let printer = async {
        while let Some(event) = rx.recv().await {
            if let ChatEvent::Delta { text } = event {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
        }
    };

    let (result, ()) = tokio::join!(turn, printer);
    println!();
    result
}

async fn run_history_show(config: &Config, last: Option<usize>) -> Result<()> {
    let history = open_history(config).await?;
    if history.is_empty() {
        println!("No messages in session {}", history.session_id());
        return Ok(());
    }

    println!(
        "{} ({} messages, {})",
        style(history.session_id()).bold(),
        history.len(),
        history.backend_name()
    );
    let log = history.log();
    let shown = match last {
        Some(n) => log.recent(n),
        None => log.recent(log.len()),
    };
    for message in shown {
        let role = match message.role() {
            Role::System => style(message.role().as_str()).dim(),
            Role::Human => style(message.role().as_str()).green(),
            Role::Assistant => style(message.role().as_str()).cyan(),
        };
        println!("{:>7}: {}", role, message.content);
    }
    Ok(())
}

async fn run_history_clear(config: &Config) -> Result<()> {
    let mut history = open_history(config).await?;
    let count = history.len();
    history
        .clear()
        .await
        .with_context(|| format!("Failed to clear session {}", history.session_id()))?;
    println!(
        "Cleared {} messages from session {}",
        count,
        history.session_id()
    );
    Ok(())
}

async fn run_status(loader: &ConfigLoader, config: &Config) -> Result<()> {
    println!("{}", style("chatlog status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    let model = if config.model.model.is_empty() {
        "(provider default)"
    } else {
        config.model.model.as_str()
    };
    println!("  Provider: {}", config.model.provider);
    println!("  Model: {}", model);
    println!();

    println!("{}", style("Providers:").bold());
    let registry = ProviderRegistry::new();
    for spec in registry.all() {
        let configured = spec.is_local
            || config
                .providers
                .get(&spec.name)
                .is_some_and(|p| !p.api_key.is_empty());
        let status = if configured {
            style("configured").green()
        } else {
            style("not configured").red()
        };
        println!("  {}: {}", spec.label(), status);
    }
    println!();

    println!("{}", style("History:").bold());
    println!("  Backend: {}", config.history.backend);
    println!("  Session: {}", config.history.session_id);
    println!("  Durability: {:?}", config.history.durability);
    match history::connect(&config.history).await {
        Ok(backend) => println!("  Store: {} ({})", style("reachable").green(), backend.name()),
        Err(e) => println!("  Store: {} ({})", style("unreachable").red(), e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatlog_core::history::{Durability, MemoryBackend};
    use chatlog_providers::{
        Completion, CompletionOptions, CompletionStream, ProviderResult, StreamEvent,
    };
    use clap::CommandFactory;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Notify;

    /// Starts a reply and then never finishes it
    struct HangingService {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl CompletionService for HangingService {
        async fn complete(
            &self,
            _messages: &[Message],
            _options: &CompletionOptions,
        ) -> ProviderResult<Completion> {
            self.started.notify_one();
            futures::future::pending().await
        }

        async fn complete_stream(
            &self,
            _messages: &[Message],
            _options: &CompletionOptions,
        ) -> ProviderResult<CompletionStream> {
            self.started.notify_one();
            Ok(Box::pin(futures::stream::pending::<ProviderResult<StreamEvent>>()))
        }

        fn default_model(&self) -> String {
            "hanging".to_string()
        }
    }

    async fn memory_history() -> ChatHistory {
        ChatHistory::open(
            "repl",
            Arc::new(MemoryBackend::new()),
            Durability::BestEffort,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_ends_chat() {
        let conversation = Conversation::new(Arc::new(HangingService {
            started: Arc::new(Notify::new()),
        }));
        let mut history = memory_history().await;
        // keep the writer alive so input never reaches end of file
        let (_keyboard, input) = tokio::io::duplex(64);
        let (tx, mut interrupts) = mpsc::unbounded_channel();
        tx.send(()).unwrap();

        run_repl(&conversation, &mut history, BufReader::new(input), &mut interrupts, false)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    async fn interrupt_pending_turn(stream: bool) {
        let started = Arc::new(Notify::new());
        let conversation = Conversation::new(Arc::new(HangingService {
            started: started.clone(),
        }));
        let mut history = memory_history().await;
        let (mut keyboard, input) = tokio::io::duplex(64);
        let (tx, mut interrupts) = mpsc::unbounded_channel();

        keyboard.write_all(b"long question\n").await.unwrap();
        let user = async {
            started.notified().await;
            tx.send(()).unwrap();
            keyboard.write_all(b"exit\n").await.unwrap();
        };
        let repl = run_repl(&conversation, &mut history, BufReader::new(input), &mut interrupts, stream);

        let (result, ()) = tokio::join!(repl, user);
        result.unwrap();

        // the question stays, no partial reply is recorded
        let messages = history.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "long question");
    }

    #[tokio::test]
    async fn test_interrupt_cancels_streamed_turn_and_keeps_chatting() {
        interrupt_pending_turn(true).await;
    }

    #[tokio::test]
    async fn test_interrupt_cancels_whole_turn() {
        interrupt_pending_turn(false).await;
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_chat_flags_override_config() {
        let cli = Cli::try_parse_from([
            "chatlog",
            "chat",
            "--session",
            "user_session_new",
            "--backend",
            "redis",
            "--provider",
            "gemini",
            "--model",
            "gemini-1.5-pro",
            "--stream",
        ])
        .unwrap();

        let Commands::Chat {
            model,
            history,
            stream,
        } = cli.command
        else {
            panic!("expected chat");
        };
        assert!(stream);

        let mut config = Config::default();
        model.apply(&mut config);
        history.apply(&mut config);
        assert_eq!(config.history.session_id, "user_session_new");
        assert_eq!(config.history.backend, BackendKind::Redis);
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_model_flag_picks_its_provider() {
        let cli = Cli::try_parse_from(["chatlog", "ask", "--model", "gpt-4o-mini", "hi"]).unwrap();
        let Commands::Ask { model, .. } = cli.command else {
            panic!("expected ask");
        };

        let mut config = Config::default();
        model.apply(&mut config);
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.model.model, "gpt-4o-mini");

        let cli = Cli::try_parse_from([
            "chatlog", "ask", "--provider", "groq", "--model", "gpt-4o-mini", "hi",
        ])
        .unwrap();
        let Commands::Ask { model, .. } = cli.command else {
            panic!("expected ask");
        };
        let mut config = Config::default();
        model.apply(&mut config);
        assert_eq!(config.model.provider, "groq");
    }

    #[test]
    fn test_history_show_takes_last() {
        let cli = Cli::try_parse_from(["chatlog", "history", "show", "--last", "2"]).unwrap();
        let Commands::History {
            command: HistoryCommands::Show { last, .. },
        } = cli.command
        else {
            panic!("expected history show");
        };
        assert_eq!(last, Some(2));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = Cli::try_parse_from(["chatlog", "chat", "--backend", "sqlite"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ask_joins_words() {
        let cli =
            Cli::try_parse_from(["chatlog", "ask", "What", "is", "81", "divided", "by", "9?"])
                .unwrap();
        let Commands::Ask { prompt, .. } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(prompt.join(" "), "What is 81 divided by 9?");
    }

    #[test]
    fn test_history_clear_takes_session() {
        let cli = Cli::try_parse_from([
            "chatlog",
            "--config-dir",
            "/tmp/chatlog-test",
            "history",
            "clear",
            "-s",
            "old",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/chatlog-test")));
        let Commands::History {
            command: HistoryCommands::Clear { history },
        } = cli.command
        else {
            panic!("expected history clear");
        };
        assert_eq!(history.session.as_deref(), Some("old"));
    }

    #[test]
    fn test_relative_log_dir_moves_under_config_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());

        let resolved = logging_config(&loader, &LoggingConfig::default());
        assert_eq!(
            PathBuf::from(resolved.dir),
            temp_dir.path().join("logs")
        );

        let mut absolute = LoggingConfig::default();
        absolute.dir = temp_dir.path().join("elsewhere").to_string_lossy().into_owned();
        let resolved = logging_config(&loader, &absolute);
        assert_eq!(resolved.dir, absolute.dir);
    }
}
