//! `chatsync`: line-oriented real-time chat client.
//!
//! Connects to a Socket.IO chat server, joins under a display name, and
//! sends every stdin line as a message. Incoming messages, presence
//! changes, and typing indicators are printed as they arrive.
//!
//! ```bash
//! cargo run --bin chatsync -- --server-url http://localhost:3001 --username ann
//!
//! # Or via environment variables
//! CHATSYNC_SERVER_URL=http://localhost:3001 CHATSYNC_USERNAME=ann cargo run
//! ```
//!
//! Type `/quit` (or close stdin) to leave.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use chrono::{Local, TimeZone};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;

use chatsync::channel::ChannelError;
use chatsync::channel::ws::WsChannel;
use chatsync::config::{CliArgs, ClientConfig};
use chatsync::engine::{EngineError, SendOutcome, SyncEngine, ViewState};
use chatsync::session::{Session, SessionError, SessionHandle};
use chatsync_proto::message::{ChatMessage, Identity};

const QUIT_COMMAND: &str = "/quit";

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("connection failed: {0}")]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // CLI args > config file > defaults.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file so they never interleave with the conversation.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(server = %config.server_url, "chatsync starting");

    let result = run(config).await;

    tracing::info!("chatsync exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "chatsync failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("chatsync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(config: ClientConfig) -> Result<(), AppError> {
    let (channel, inbound) =
        WsChannel::connect(&config.server_url, &config.to_channel_config()).await?;
    println!("* connected to {}", channel.endpoint());

    let engine = SyncEngine::new(channel, config.to_engine_config());
    let session = Session::spawn(engine, inbound, config.channel_capacity);
    let renderer = tokio::spawn(render(session.view()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if join(&session, config.username, &mut lines).await? {
        while let Some(line) = lines.next_line().await? {
            if line.trim() == QUIT_COMMAND {
                break;
            }
            session.input(line).await?;
            if session.submit().await? == SendOutcome::NotJoined {
                tracing::warn!("submit rejected after join");
            }
        }
    }

    session.shutdown().await?;
    // The renderer ends once the session drops its view sender.
    if let Err(e) = renderer.await {
        tracing::warn!(error = %e, "renderer task failed");
    }
    Ok(())
}

/// Join with the configured name, prompting until a usable one is given.
///
/// Returns `false` if stdin closes before a join succeeds.
async fn join(
    session: &SessionHandle,
    preset: Option<String>,
    lines: &mut StdinLines,
) -> Result<bool, AppError> {
    let mut candidate = preset;
    loop {
        let name = if let Some(name) = candidate.take() {
            name
        } else {
            print!("username: ");
            std::io::stdout().flush()?;
            match lines.next_line().await? {
                Some(line) => line,
                None => return Ok(false),
            }
        };

        match session.join(name).await {
            Ok(()) => return Ok(true),
            Err(SessionError::Engine(EngineError::InvalidIdentity(e))) => println!("* {e}"),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Print whatever changed in the view since the last snapshot.
async fn render(mut view: watch::Receiver<ViewState>) {
    let mut printed = 0;
    let mut online: Vec<Identity> = Vec::new();
    let mut typing: Option<String> = None;
    let mut connected = true;

    loop {
        {
            let state = view.borrow_and_update();

            for message in state.timeline.iter().skip(printed) {
                println!("{}", format_message(message, &Local));
            }
            printed = state.timeline.len();

            if state.online != online {
                online.clone_from(&state.online);
                let names: Vec<&str> = online.iter().map(Identity::as_str).collect();
                println!("* online: {}", names.join(", "));
            }

            if state.typing_text != typing {
                typing.clone_from(&state.typing_text);
                if let Some(text) = &typing {
                    println!("* {text}");
                }
            }

            if connected && !state.connected {
                connected = false;
                println!("* disconnected from server");
            }
        }

        if view.changed().await.is_err() {
            break;
        }
    }
}

/// `[h:mm am] user: text` in the given time zone.
fn format_message<Tz>(message: &ChatMessage, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let local = message.timestamp.as_datetime().with_timezone(tz);
    format!(
        "[{}] {}: {}",
        local.format("%-I:%M %P"),
        message.username,
        message.message
    )
}
