// ⚙️ Configuration - payment-dispatch.toml
// Todo es opcional: sin archivo se usan los defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when no --config is given
pub const DEFAULT_CONFIG_FILE: &str = "payment-dispatch.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub roster: RosterConfig,

    #[serde(default)]
    pub mail: MailConfig,
}

// ============================================================================
// ROSTER
// ============================================================================

/// Where to find the supplier columns in the roster CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Header of the legal/trade name column
    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// Header of the email column
    #[serde(default = "default_email_column")]
    pub email_column: String,

    /// Field delimiter (Excel in es-AR exports with ";")
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_name_column() -> String {
    "Razón Social".to_string()
}

fn default_email_column() -> String {
    "Mail".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            name_column: default_name_column(),
            email_column: default_email_column(),
            delimiter: default_delimiter(),
        }
    }
}

impl RosterConfig {
    /// Delimiter as the single byte the csv reader wants
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [b] => Ok(*b),
            _ => anyhow::bail!(
                "Roster delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            ),
        }
    }
}

// ============================================================================
// MAIL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Send through an SMTP relay
    Smtp,
    /// Write .eml files into `outbox_dir`
    Outbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    /// Sender mailbox, e.g. "Tesorería <tesoreria@example.com>"
    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,

    #[serde(default)]
    pub smtp: SmtpConfig,
}

fn default_transport() -> TransportKind {
    TransportKind::Outbox
}

fn default_from() -> String {
    "tesoreria@localhost.localdomain".to_string()
}

fn default_outbox_dir() -> PathBuf {
    PathBuf::from("outbox")
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            from: default_from(),
            outbox_dir: default_outbox_dir(),
            smtp: SmtpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    /// Name of the environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// STARTTLS on `port`; false means implicit TLS
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_password_env() -> String {
    "PAYMENT_DISPATCH_SMTP_PASSWORD".to_string()
}

fn default_starttls() -> bool {
    true
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password_env: default_password_env(),
            starttls: default_starttls(),
        }
    }
}

impl SmtpConfig {
    /// Password from the configured environment variable, if set
    pub fn password(&self) -> Option<String> {
        std::env::var(&self.password_env).ok()
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Explicit path, else ./payment-dispatch.toml if present, else defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            log::debug!("Using config file {}", fallback.display());
            return Self::load(fallback);
        }

        Ok(Self::default())
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
