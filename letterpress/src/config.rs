use crate::error::{MailError, Result};
use crate::mime::TransferEncoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Default sender, either `user@example.com` or `Name <user@example.com>`
    pub sender: Option<String>,
    pub smtp: SmtpConfig,
    pub templates: TemplateDirConfig,
    pub mime: MimeConfig,
    pub logging: LoggingConfig,
}

/// How the SMTP session is protected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Unencrypted
    #[default]
    Plain,
    /// Upgrade a plain connection with STARTTLS (usually port 587)
    StartTls,
    /// TLS from the first byte, SMTPS (usually port 465)
    #[serde(alias = "ssl")]
    Tls,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    /// PEM bundle of extra trusted certificates, added to the system roots
    pub ca_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Send credentials even when the session is not encrypted
    pub allow_insecure_auth: bool,
    pub local_hostname: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            security: SmtpSecurity::Plain,
            ca_file: None,
            username: None,
            password: None,
            allow_insecure_auth: false,
            local_hostname: None,
            timeout_secs: 30,
        }
    }
}

/// File naming rules for templates stored as directories
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateDirConfig {
    pub subject_name: String,
    pub html_name: String,
    pub text_name: String,
    /// Files matching this pattern are attached inline; capture group 1
    /// (or the whole match) becomes the attachment filename
    pub inline_pattern: String,
}

impl Default for TemplateDirConfig {
    fn default() -> Self {
        Self {
            subject_name: "subject.txt".to_string(),
            html_name: "index.htm".to_string(),
            text_name: "index.txt".to_string(),
            inline_pattern: r"^i-(.*)".to_string(),
        }
    }
}

/// Encoding rules applied when building MIME trees.
///
/// Text parts are always utf-8. Plain ASCII bodies go out as 7bit,
/// anything else uses `transfer_encoding`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MimeConfig {
    pub transfer_encoding: TransferEncoding,
}

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            transfer_encoding: TransferEncoding::Base64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MailError::Config(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MailError::Config(e.to_string()))
    }
}
