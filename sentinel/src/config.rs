use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::matcher::MatchCriteria;

pub const DEFAULT_INTERVAL_SECS: f64 = 15.0;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SMTP_RELAY: &str = "smtp.gmail.com:587";
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "{executable} process {pid} ended";

/// Root configuration. Deserialized from the optional config file, then
/// overlaid with command line flags. Built once at startup and passed by
/// reference to everything that needs it.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub desktop: DesktopConfig,
}

/// What to watch and how often.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default)]
    pub pids: Vec<u32>,
    /// Shell-style wildcards over command names.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Regular expressions over command names.
    #[serde(default)]
    pub command_regexes: Vec<String>,
    /// Keep scanning for new processes matching the patterns above.
    #[serde(default)]
    pub watch_new: bool,
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
    pub label: Option<String>,
    /// Subject line; `{executable}`, `{name}`, `{pid}` and `{label}` are substituted.
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
    /// Upper bound on a single backend delivery.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            pids: Vec::new(),
            commands: Vec::new(),
            command_regexes: Vec::new(),
            watch_new: false,
            interval_secs: DEFAULT_INTERVAL_SECS,
            label: None,
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
        }
    }
}

/// Mail delivery over an authenticated STARTTLS relay. Enabled when at least
/// one recipient is configured.
#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    /// `host[:port]`, port defaults to 587.
    #[serde(default = "default_smtp_relay")]
    pub smtp: String,
    pub login: Option<String>,
    pub password: Option<String>,
    /// Sender address; falls back to `login`.
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp: DEFAULT_SMTP_RELAY.to_string(),
            login: None,
            password: None,
            from: None,
            to: Vec::new(),
        }
    }
}

impl EmailConfig {
    pub fn enabled(&self) -> bool {
        !self.to.is_empty()
    }
}

/// Chat delivery through a Slack-compatible incoming webhook.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ChatConfig {
    pub webhook_url: Option<String>,
    /// Channels to post to. Empty means the webhook's default channel.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl ChatConfig {
    pub fn enabled(&self) -> bool {
        self.webhook_url.is_some() || !self.channels.is_empty()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DesktopConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Overlays command line flags. Repeatable selections are appended to the
    /// file's lists; scalar flags replace file values when given.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        let watch = &mut self.watch;
        watch.pids.extend(&cli.pids);
        watch.commands.extend(cli.commands.iter().cloned());
        watch.command_regexes.extend(cli.command_regexes.iter().cloned());
        watch.watch_new |= cli.watch_new;
        if let Some(interval) = cli.interval {
            watch.interval_secs = interval;
        }
        if cli.tag.is_some() {
            watch.label = cli.tag.clone();
        }

        let email = &mut self.email;
        email.to.extend(cli.to.iter().cloned());
        if cli.login.is_some() {
            email.login = cli.login.clone();
        }
        if cli.password.is_some() {
            email.password = cli.password.clone();
        }
        if let Some(smtp) = &cli.smtp {
            email.smtp = smtp.clone();
        }

        self.chat.channels.extend(cli.channels.iter().cloned());
        if cli.webhook.is_some() {
            self.chat.webhook_url = cli.webhook.clone();
        }

        self.desktop.enabled |= cli.notify;
        self
    }

    /// Rejects values that would make the poll loop misbehave.
    /// The interval must convert to a non-zero [`Duration`]: NaN, negative,
    /// overflowing and sub-nanosecond values are all rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.watch.interval_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(period) if !period.is_zero() => Ok(()),
            _ => Err(ConfigError::Interval(secs)),
        }
    }

    /// Only meaningful after [`Config::validate`] succeeded. An invalid value
    /// yields the default interval instead of panicking.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.watch.interval_secs)
            .ok()
            .filter(|period| !period.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_INTERVAL_SECS))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.watch.send_timeout_secs)
    }

    /// Compiles every configured pattern. The first invalid one is fatal.
    pub fn match_criteria(&self) -> Result<MatchCriteria, ConfigError> {
        let mut criteria = MatchCriteria::new();
        for pattern in &self.watch.commands {
            criteria.add_wildcard(pattern)?;
        }
        for pattern in &self.watch.command_regexes {
            criteria.add_regex(pattern)?;
        }
        Ok(criteria)
    }

    /// Subject template with the label appended when one is set and the
    /// template does not already place it.
    pub fn subject_template(&self) -> String {
        let template = &self.watch.subject_template;
        match &self.watch.label {
            Some(_) if !template.contains("{label}") => format!("{template}: {{label}}"),
            _ => template.clone(),
        }
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    load(path)
}

/// Loads the config file at `path`, which must exist.
pub fn load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_interval() -> f64 {
    DEFAULT_INTERVAL_SECS
}

fn default_subject_template() -> String {
    DEFAULT_SUBJECT_TEMPLATE.to_string()
}

fn default_send_timeout() -> u64 {
    DEFAULT_SEND_TIMEOUT_SECS
}

fn default_smtp_relay() -> String {
    DEFAULT_SMTP_RELAY.to_string()
}
