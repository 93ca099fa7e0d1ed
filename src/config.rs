//! Service configuration
//!
//! Every option is a command-line flag with an environment variable
//! fallback. A `.env` file is loaded before parsing (see `crate::run`).

use clap::Parser;
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Parser)]
#[command(name = "ftpdrop", about = "FTP drop box that forwards uploaded images to a webhook")]
pub struct Config {
    /// FTP login name
    #[arg(long, env = "FTP_USER", default_value = "ftp")]
    pub ftp_user: String,

    /// FTP password
    #[arg(long, env = "FTP_PASS", default_value = "ftp", hide_env_values = true)]
    pub ftp_pass: String,

    /// Directory served over FTP and scanned for images
    #[arg(long, env = "FTP_HOME", default_value = "/data")]
    pub ftp_home: PathBuf,

    /// Control connection port
    #[arg(long, env = "FTP_PORT", default_value_t = 21)]
    pub ftp_port: u16,

    /// Passive data port range, START-END (inclusive)
    #[arg(long, env = "PASV_PORTS", default_value = "30000-30010", value_parser = parse_passive_ports)]
    pub pasv_ports: PassivePorts,

    /// Address advertised to clients in passive mode (IPv4 or hostname)
    #[arg(long, env = "FTP_PUBLIC_HOST")]
    pub ftp_public_host: Option<String>,

    /// Seconds between directory scans
    #[arg(long, env = "SCAN_INTERVAL", default_value = "5", value_parser = parse_interval)]
    pub scan_interval: Duration,

    /// Seconds a file must sit unmodified before the scanner picks it up
    #[arg(long, env = "SCAN_MIN_AGE", default_value = "2", value_parser = parse_min_age)]
    pub scan_min_age: Duration,

    /// Webhook receiving the images; deliveries are skipped when unset
    #[arg(long, env = "DISCORD_WEBHOOK_URL", value_parser = parse_webhook_url, hide_env_values = true)]
    pub webhook_url: Option<String>,

    /// Message posted alongside each image
    #[arg(long, env = "DISCORD_MESSAGE", default_value = "New image upload")]
    pub message: String,
}

impl Config {
    /// Control connection bind address
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.ftp_port)
    }
}

/// Inclusive passive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassivePorts {
    pub start: u16,
    pub end: u16,
}

impl PassivePorts {
    /// The range in libunftp's form, where `end` is still inclusive
    pub fn unftp_range(&self) -> Range<u16> {
        self.start..self.end
    }

    pub fn port_count(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }
}

impl FromStr for PassivePorts {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split('-').collect();
        let [start, end] = parts.as_slice() else {
            return Err(ConfigError::PortRangeFormat(value.to_string()));
        };

        let start = parse_port(start)?;
        let end = parse_port(end)?;
        if start > end {
            return Err(ConfigError::PortRangeOrder { start, end });
        }

        Ok(Self { start, end })
    }
}

impl std::fmt::Display for PassivePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::PortNumber {
        value: value.to_string(),
    })
}

fn parse_passive_ports(input: &str) -> Result<PassivePorts, ConfigError> {
    input.parse()
}

fn parse_seconds(input: &str) -> Result<Duration, ConfigError> {
    let seconds: f64 = input
        .trim()
        .parse()
        .map_err(|_| ConfigError::Duration(input.to_string()))?;
    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::Duration(input.to_string()))
}

fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let interval = parse_seconds(input)?;
    if interval.is_zero() {
        return Err(ConfigError::NotPositive { name: "scan interval" });
    }
    Ok(interval)
}

fn parse_min_age(input: &str) -> Result<Duration, ConfigError> {
    parse_seconds(input)
}

fn parse_webhook_url(input: &str) -> Result<String, ConfigError> {
    reqwest::Url::parse(input.trim())
        .map(|url| url.to_string())
        .map_err(|e| ConfigError::WebhookUrl(format!("{input}: {e}")))
}
