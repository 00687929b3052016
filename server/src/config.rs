//! Command-line configuration for the server binary.

use crate::game::enhanced::EnhancedSettings;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tcr_shared::DEFAULT_PORT;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Tower-and-troop match server")]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Flat JSON file holding accounts and their progress
    #[arg(long, default_value = "data/users.json")]
    pub users_file: PathBuf,
    /// Flat JSON file holding tower and troop base stats
    #[arg(long, default_value = "data/specs.json")]
    pub specs_file: PathBuf,
    /// Length of an Enhanced match in seconds
    #[arg(long, default_value = "180")]
    pub match_secs: u64,
    /// Interval between Enhanced match ticks in milliseconds
    #[arg(long, default_value = "1000")]
    pub tick_ms: u64,
    /// Delay before a finished Enhanced match is dropped, in milliseconds
    #[arg(long, default_value = "2000")]
    pub grace_ms: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn enhanced_settings(&self) -> EnhancedSettings {
        EnhancedSettings {
            match_duration: Duration::from_secs(self.match_secs),
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
            grace_period: Duration::from_millis(self.grace_ms),
            ..EnhancedSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse_from(["tcr-server"]);
        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.users_file, PathBuf::from("data/users.json"));

        let settings = config.enhanced_settings();
        assert_eq!(settings.match_duration, Duration::from_secs(180));
        assert_eq!(settings.tick_interval, Duration::from_secs(1));
        assert_eq!(settings.grace_period, Duration::from_secs(2));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::parse_from([
            "tcr-server",
            "-H",
            "0.0.0.0",
            "--port",
            "7000",
            "--match-secs",
            "30",
            "--tick-ms",
            "0",
        ]);
        assert_eq!(config.address(), "0.0.0.0:7000");
        let settings = config.enhanced_settings();
        assert_eq!(settings.match_duration, Duration::from_secs(30));
        assert_eq!(settings.tick_interval, Duration::from_millis(1));
    }
}
