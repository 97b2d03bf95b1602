use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CREDENTIAL_MAX_LENGTH, FTP_BUFFER_SIZE, FTP_CMD_PORT, FTP_CMD_TIMEOUT_MS, FTP_CYCLE_TIME_MS,
    FTP_DATA_TIMEOUT_MS, FTP_PASV_DATA_PORT, USERNAME_REGEX,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub cmd_port: u16,
    pub pasv_port: u16,
    /// Public IP address advertised in PASV replies.
    pub pasv_address: String,
    pub username: String,
    pub password: String,
    pub idle_timeout_ms: Option<u32>,
    pub data_timeout_ms: Option<u32>,
    pub cycle_time_ms: Option<u32>,
    pub buffer_size: Option<usize>, // Optional to allow default value
    /// Uploads to this exact path are diverted into the firmware updater.
    pub update_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cmd_port: FTP_CMD_PORT,
            pasv_port: FTP_PASV_DATA_PORT,
            pasv_address: String::from("192.168.4.1"),
            username: String::from("micro"),
            password: String::from("python"),
            idle_timeout_ms: Some(FTP_CMD_TIMEOUT_MS),
            data_timeout_ms: Some(FTP_DATA_TIMEOUT_MS),
            cycle_time_ms: Some(FTP_CYCLE_TIME_MS),
            buffer_size: Some(FTP_BUFFER_SIZE),
            update_path: Some(String::from("/flash/sys/appimg.bin")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse configuration file: {}", path))?;

        // Set defaults if not specified
        let defaults = ServerConfig::default();
        if config.server.idle_timeout_ms.is_none() {
            config.server.idle_timeout_ms = defaults.idle_timeout_ms;
        }
        if config.server.data_timeout_ms.is_none() {
            config.server.data_timeout_ms = defaults.data_timeout_ms;
        }
        if config.server.cycle_time_ms.is_none() {
            config.server.cycle_time_ms = defaults.cycle_time_ms;
        }
        if config.server.buffer_size.is_none() {
            config.server.buffer_size = defaults.buffer_size;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let username_re = Regex::new(USERNAME_REGEX).context("invalid username pattern")?;
        if !username_re.is_match(&self.server.username) {
            bail!(
                "configured username {:?} is not a valid device username",
                self.server.username
            );
        }
        if self.server.password.is_empty() || self.server.password.len() > CREDENTIAL_MAX_LENGTH {
            bail!(
                "configured password must be 1..={} bytes",
                CREDENTIAL_MAX_LENGTH
            );
        }
        if self.server.cycle_time_ms == Some(0) {
            bail!("cycle_time_ms must be greater than zero");
        }
        self.server
            .pasv_address
            .parse::<std::net::Ipv4Addr>()
            .with_context(|| {
                format!(
                    "pasv_address {:?} is not an IPv4 address",
                    self.server.pasv_address
                )
            })?;
        Ok(())
    }

    /// Command-idle limit expressed in scheduler ticks.
    pub fn idle_limit_ticks(&self) -> u32 {
        self.server.idle_timeout_ms.unwrap_or(FTP_CMD_TIMEOUT_MS) / self.cycle_time_ms()
    }

    /// Data-idle limit expressed in scheduler ticks.
    pub fn data_limit_ticks(&self) -> u32 {
        self.server.data_timeout_ms.unwrap_or(FTP_DATA_TIMEOUT_MS) / self.cycle_time_ms()
    }

    pub fn cycle_time_ms(&self) -> u32 {
        self.server.cycle_time_ms.unwrap_or(FTP_CYCLE_TIME_MS).max(1)
    }

    pub fn buffer_size(&self) -> usize {
        self.server.buffer_size.unwrap_or(FTP_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.cmd_port, 21);
        assert_eq!(config.buffer_size(), 512);
    }

    #[test]
    fn rejects_bad_username() {
        let mut config = Config::default();
        config.server.username = String::from("no spaces allowed");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_pasv_address() {
        let mut config = Config::default();
        config.server.pasv_address = String::from("not-an-ip");
        assert!(config.validate().is_err());
    }

    #[test]
    fn tick_limits_follow_cycle_time() {
        let mut config = Config::default();
        config.server.cycle_time_ms = Some(100);
        config.server.data_timeout_ms = Some(5_000);
        assert_eq!(config.data_limit_ticks(), 50);
    }
}
