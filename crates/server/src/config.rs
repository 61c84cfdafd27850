use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 39333;
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Parser, Debug, Clone, Default)]
#[command(version, about = "Local map service for Hexatlas worlds", long_about = None)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML configuration file")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Address to bind the HTTP server to")]
    pub addr: Option<SocketAddr>,
    #[arg(long, help = "Path to the world database")]
    pub db: Option<PathBuf>,
    #[arg(long, help = "Quiet period before an edit is autosaved, in milliseconds")]
    pub debounce_ms: Option<u64>,
    #[arg(long, help = "Log level (error, warn, info, debug, trace)")]
    pub log_level: Option<String>,
}

/// Server settings: defaults, then the YAML file, then CLI flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub autosave_debounce_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            db_path: default_db_path(),
            autosave_debounce_ms: DEFAULT_DEBOUNCE_MS,
            log_level: "info".to_string(),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hexatlas")
        .join("hexatlas.db")
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut cfg = match &cli.config {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        if let Some(addr) = cli.addr {
            cfg.addr = addr;
        }
        if let Some(db) = &cli.db {
            cfg.db_path = db.clone();
        }
        if let Some(ms) = cli.debounce_ms {
            cfg.autosave_debounce_ms = ms;
        }
        if let Some(level) = &cli.log_level {
            cfg.log_level = level.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.autosave_debounce_ms > MAX_DEBOUNCE_MS {
            anyhow::bail!(
                "autosave_debounce_ms must be at most {MAX_DEBOUNCE_MS}, got {}",
                self.autosave_debounce_ms
            );
        }
        if !matches!(
            self.log_level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            anyhow::bail!("unknown log level: {}", self.log_level);
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
