use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use derive_setters::Setters;
use directories::{ProjectDirs, UserDirs};
use serde::Deserialize;
use tracing::debug;

use crate::domain::RvError;

pub const DEFAULT_SERVER: &str = "http://localhost:5000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVENT_POLL_TIME: u64 = 100;

#[derive(Parser, Debug, Default)]
#[command(version, about = "A tui based resume manager.")]
pub struct Args {
    /// Base URL of the resume server
    #[arg(short, long, value_name = "URL")]
    pub server: Option<String>,

    /// Config file, defaults to the user config directory
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory downloaded resumes are written to
    #[arg(short, long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Log file (the terminal is used by the ui)
    #[arg(short, long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Terminal event poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub poll_ms: Option<u64>,
}

/// Optional settings read from `config.toml`.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server: Option<String>,
    download_dir: Option<String>,
    log_file: Option<String>,
    timeout_secs: Option<u64>,
    event_poll_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Setters)]
#[setters(prefix = "with_")]
pub struct RvConfig {
    pub server: String,
    pub download_dir: PathBuf,
    pub log_file: PathBuf,
    pub timeout: Duration,
    pub event_poll_time: u64,
}

impl Default for RvConfig {
    fn default() -> Self {
        RvConfig {
            server: DEFAULT_SERVER.to_string(),
            download_dir: PathBuf::from("."),
            log_file: PathBuf::from("rv.log"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            event_poll_time: DEFAULT_EVENT_POLL_TIME,
        }
    }
}

impl RvConfig {
    /// Defaults, overwritten by the config file, overwritten by the command line.
    pub fn load(args: &Args) -> Result<Self, RvError> {
        let mut config = RvConfig::default();
        if let Some(download_dir) =
            UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        {
            config.download_dir = download_dir;
        }
        if let Some(dirs) = ProjectDirs::from("", "", "rv") {
            config.log_file = dirs.data_local_dir().join("rv.log");
        }

        let path = match &args.config {
            Some(path) => Some(expand(&path.to_string_lossy())),
            None => ProjectDirs::from("", "", "rv")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .filter(|p| p.exists()),
        };
        if let Some(path) = path {
            debug!("Reading config {}", path.display());
            let content = fs::read_to_string(&path)?;
            config = config.merge_file(toml::from_str(&content)?);
        }

        Ok(config.merge_args(args))
    }

    fn merge_file(self, file: FileConfig) -> Self {
        let mut config = self;
        if let Some(server) = file.server {
            config = config.with_server(server);
        }
        if let Some(dir) = file.download_dir {
            config = config.with_download_dir(expand(&dir));
        }
        if let Some(log) = file.log_file {
            config = config.with_log_file(expand(&log));
        }
        if let Some(secs) = file.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = file.event_poll_time {
            config = config.with_event_poll_time(ms);
        }
        config
    }

    fn merge_args(self, args: &Args) -> Self {
        let mut config = self;
        if let Some(server) = &args.server {
            config = config.with_server(server.clone());
        }
        if let Some(dir) = &args.download_dir {
            config = config.with_download_dir(expand(&dir.to_string_lossy()));
        }
        if let Some(log) = &args.log_file {
            config = config.with_log_file(expand(&log.to_string_lossy()));
        }
        if let Some(secs) = args.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = args.poll_ms {
            config = config.with_event_poll_time(ms);
        }
        config.server = config.server.trim_end_matches('/').to_string();
        config
    }
}

/// Expands `~` and environment variables, falls back to the raw text.
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(path),
    }
}
