//! Command-Line Interface (CLI) argument parsing.
//!
//! The arguments are parsed at startup and merged on top of the TOML file and
//! the environment, so a flag always wins over the other sources.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Relays Prometheus Alertmanager notifications to DingTalk robots.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on for Alertmanager webhooks.
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable the `POST /-/reload` lifecycle endpoint.
    #[arg(long)]
    pub enable_lifecycle: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(addr) = self.listen_address {
            dict.insert("listen_address".into(), Value::from(addr.to_string()));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        // A bare flag can only switch the endpoint on; leaving it out must not
        // override a `true` coming from the file.
        if self.enable_lifecycle {
            dict.insert("enable_lifecycle".into(), Value::from(true));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "dingrelay",
            "--config",
            "/etc/dingrelay/config.toml",
            "--listen-address",
            "127.0.0.1:9000",
            "--enable-lifecycle",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/dingrelay/config.toml")));
        assert_eq!(cli.listen_address, Some("127.0.0.1:9000".parse().unwrap()));
        assert!(cli.enable_lifecycle);
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn test_provider_only_emits_given_flags() {
        let cli = Cli {
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let data = cli.data().unwrap();
        let dict = &data[&Profile::Default];

        assert_eq!(dict.len(), 1);
        assert_eq!(dict["log_level"].as_str(), Some("debug"));
    }
}
