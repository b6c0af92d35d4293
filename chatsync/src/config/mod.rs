//! Client settings.
//!
//! Every value is resolved from, in order of precedence: command-line flags
//! (or their `CHATSYNC_*` environment variables), the TOML file, and the
//! built-in defaults. The file lives at `~/.config/chatsync/config.toml`
//! unless `--config` names another one:
//!
//! ```toml
//! [server]
//! url = "http://localhost:3001"
//! connect_timeout_secs = 10
//! channel_capacity = 256
//!
//! [session]
//! username = "ann"
//! typing_debounce_ms = 1000
//! ```
//!
//! The default file may be absent; a file named with `--config` may not.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::engine::{DEFAULT_TYPING_DEBOUNCE, EngineConfig};

const DEFAULT_SERVER_URL: &str = "http://localhost:3001";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Failure to obtain settings from the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read, or an explicit path is missing.
    #[error("cannot read {}: {source}", .path.display())]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has a value of the wrong type.
    #[error("invalid config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A key parsed but holds a value the client cannot run with.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Dotted key, e.g. `server.channel_capacity`.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// On-disk layout. Absent keys fall through to the next layer.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerSection,
    session: SessionSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionSection {
    username: Option<String>,
    typing_debounce_ms: Option<u64>,
}

impl ConfigFile {
    /// Read `explicit` if given, otherwise the per-user default file.
    fn locate_and_read(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::read(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::read(&path),
            _ => Ok(Self::default()),
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Self = toml::from_str(&text)?;
        file.validate()?;
        Ok(file)
    }

    /// Reject values that parse but would break the client at runtime.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.channel_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "server.channel_capacity",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// `~/.config/chatsync/config.toml`, or `None` on platforms without a
/// config directory.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chatsync").join("config.toml"))
}

/// Settings after all layers are merged.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat server (`http://host:port`) or a `ws://` endpoint.
    pub server_url: String,
    /// Bound on connecting plus the Socket.IO handshake.
    pub connect_timeout: Duration,
    /// Queue depth for inbound events and session commands.
    pub channel_capacity: usize,
    /// Name to join with. The binary asks for one when unset.
    pub username: Option<String>,
    /// Quiet period before a local `stopTyping` goes out.
    pub typing_debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            username: None,
            typing_debounce: DEFAULT_TYPING_DEBOUNCE,
        }
    }
}

impl ClientConfig {
    /// Merge `cli` over the config file over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a present file cannot be read or parsed,
    /// holds an unusable value, or when `--config` points at a missing file.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = ConfigFile::locate_and_read(cli.config.as_deref())?;
        Ok(Self::merge(cli, file))
    }

    fn merge(cli: &CliArgs, file: ConfigFile) -> Self {
        let ConfigFile { server, session } = file;

        Self {
            server_url: cli
                .server_url
                .clone()
                .or(server.url)
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            connect_timeout: server
                .connect_timeout_secs
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs),
            channel_capacity: server
                .channel_capacity
                .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            username: cli.username.clone().or(session.username),
            typing_debounce: cli
                .typing_debounce_ms
                .or(session.typing_debounce_ms)
                .map_or(DEFAULT_TYPING_DEBOUNCE, Duration::from_millis),
        }
    }

    /// Settings for [`WsChannel::connect`](crate::channel::ws::WsChannel::connect).
    #[must_use]
    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            connect_timeout: self.connect_timeout,
            inbound_capacity: self.channel_capacity,
        }
    }

    /// Settings for [`SyncEngine::new`](crate::engine::SyncEngine::new).
    #[must_use]
    pub const fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            typing_debounce: self.typing_debounce,
        }
    }
}

/// Command-line interface of the `chatsync` binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time chat client")]
pub struct CliArgs {
    /// Chat server URL, e.g. `http://localhost:3001`.
    #[arg(long, env = "CHATSYNC_SERVER_URL")]
    pub server_url: Option<String>,

    /// Name to join the chat with.
    #[arg(long, env = "CHATSYNC_USERNAME")]
    pub username: Option<String>,

    /// Milliseconds of silence before typing is reported as stopped.
    #[arg(long)]
    pub typing_debounce_ms: Option<u64>,

    /// Alternate config file; must exist.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "CHATSYNC_LOG")]
    pub log_level: String,

    /// Log file (defaults to `chatsync.log` in the temp directory).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
