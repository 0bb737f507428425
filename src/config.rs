//! Configuration management for dingrelay
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer, from lowest to highest priority: built-in
//! defaults, the TOML file, `DINGRELAY_*` environment variables, the fan-out
//! variables `HTTP_THIRD_API_URL` / `HTTP_THIRD_API_SOURCE`, and CLI flags.

use crate::cli::Cli;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Used when no `--config` flag is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// DingTalk rejects markdown bodies above this size.
pub const DINGTALK_MAX_MESSAGE_BYTES: usize = 20_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to extract configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Address the webhook server binds to.
    pub listen_address: SocketAddr,
    /// The logging level for the application.
    pub log_level: String,
    /// Exposes `POST /-/reload` when set.
    #[serde(default)]
    pub enable_lifecycle: bool,
    /// Upper bound for every outbound HTTP call, connect included.
    pub timeout_seconds: u64,
    /// Rendered markdown text is cut down to this many bytes.
    pub max_message_bytes: usize,
    /// Template files; each one is registered as a partial named after its
    /// file stem.
    #[serde(default)]
    pub templates: Vec<PathBuf>,
    /// Title and text templates used by targets without their own.
    pub default_message: MessageTemplate,
    /// Outbound robots, keyed by the name used in `/{name}/send`.
    #[serde(default)]
    pub targets: HashMap<String, Target>,
    /// Optional secondary sink receiving a copy of every inbound payload.
    #[serde(default)]
    pub fanout: FanoutConfig,
}

/// A pair of Handlebars sources rendering a message title and body.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MessageTemplate {
    pub title: String,
    pub text: String,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            title: "{{> link_title}}".to_string(),
            text: "{{> link_content}}".to_string(),
        }
    }
}

/// Per-target template overrides; a missing half falls back to the default.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MessageOverride {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Who gets mentioned when a target receives a message.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Mention {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub mobiles: Vec<String>,
}

/// A named DingTalk robot.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Target {
    /// Filled in from the `targets` map key after loading.
    #[serde(skip)]
    pub name: String,
    /// Robot webhook URL, access token included.
    pub url: Url,
    /// Signing secret for robots with "additional signature" security enabled.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub mention: Option<Mention>,
    #[serde(default)]
    pub message: Option<MessageOverride>,
}

impl Target {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            secret: None,
            mention: None,
            message: None,
        }
    }
}

/// Configuration for the secondary fan-out sink.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct FanoutConfig {
    /// Sink address; fan-out is disabled when absent or empty.
    #[serde(default)]
    pub url: Option<String>,
    /// Tag attached to every forwarded payload.
    #[serde(default)]
    pub source: String,
}

impl Config {
    /// Loads the application configuration, layering every source.
    ///
    /// An explicitly requested file must exist; the implicit default file
    /// may be absent.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(path) = &cli.config {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
        }
        let config: Config = Self::figment(cli).extract()?;
        config.finalize()
    }

    /// The layered figment backing [`Config::load`].
    pub fn figment(cli: &Cli) -> Figment {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // e.g. DINGRELAY_LOG_LEVEL=debug, DINGRELAY_TARGETS__OPS__URL=...
            .merge(Env::prefixed("DINGRELAY_").split("__"))
            .merge(
                Env::prefixed("HTTP_THIRD_API_")
                    .only(&["url", "source"])
                    .map(|key| format!("fanout.{}", key).into()),
            )
            .merge(cli.clone())
    }

    /// Names targets after their keys and checks cross-field invariants.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        for (name, target) in self.targets.iter_mut() {
            target.name = name.clone();
        }
        if matches!(self.fanout.url.as_deref(), Some(url) if url.trim().is_empty()) {
            self.fanout.url = None;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_message_bytes must be greater than zero".to_string(),
            ));
        }
        for (name, target) in &self.targets {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "invalid target name {:?}",
                    name
                )));
            }
            if !matches!(target.url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "target {:?} has unsupported URL scheme {:?}",
                    name,
                    target.url.scheme()
                )));
            }
        }
        if let Some(url) = &self.fanout.url {
            Url::parse(url).map_err(|e| {
                ConfigError::Invalid(format!("invalid fan-out URL {:?}: {}", url, e))
            })?;
        }
        Ok(())
    }

    /// The upper bound applied to outbound calls.
    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8060)),
            log_level: "info".to_string(),
            enable_lifecycle: false,
            timeout_seconds: 5,
            max_message_bytes: DINGTALK_MAX_MESSAGE_BYTES,
            templates: Vec::new(),
            default_message: MessageTemplate::default(),
            targets: HashMap::new(),
            fanout: FanoutConfig::default(),
        }
    }
}
