//! Configuration loader and validator for the database watcher.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::{Backend, OutputFormat};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

static IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap());

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub wecom: Wecom,
    pub db: Db,
    /// Secondary MySQL source queried for failed pushes.
    #[serde(default)]
    pub mysql: Option<SecondaryMySql>,
    #[serde(default)]
    pub message: MessageTemplates,
    #[serde(default)]
    pub robot: Option<Robot>,
    #[serde(default)]
    pub tables: Tables,
}

/// WeCom application credentials used by the app push channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wecom {
    #[serde(default)]
    pub corpid: String,
    #[serde(default)]
    pub corpsecret: String,
    #[serde(default)]
    pub agentid: i64,
    /// Receivers, `|` separated.
    #[serde(default)]
    pub touser: String,
}

/// Primary database connection block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Db {
    pub driver: Backend,
    #[serde(default)]
    pub sqlite_path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    8
}

fn default_enabled() -> bool {
    true
}

/// Optional secondary MySQL block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecondaryMySql {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Overrides for the message templates. Unset slots use built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageTemplates {
    pub title_text: Option<String>,
    pub item_text: Option<String>,
    pub footer_text: Option<String>,
    pub title_markdown: Option<String>,
    pub item_markdown: Option<String>,
    pub footer_markdown: Option<String>,
}

/// Group robot webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Robot {
    pub webhook: String,
    /// Members to mention in text messages, `|` separated.
    #[serde(default)]
    pub mentioned_list: String,
    #[serde(default)]
    pub format: OutputFormat,
}

/// Table names interpolated into the fixed queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tables {
    #[serde(default = "default_jobcode_table")]
    pub jobcode: String,
    #[serde(default = "default_alerts_table")]
    pub alerts: String,
    #[serde(default = "default_failed_push_table")]
    pub failed_push: String,
}

fn default_jobcode_table() -> String {
    "bd_jobbasfil".into()
}

fn default_alerts_table() -> String {
    "alerts".into()
}

fn default_failed_push_table() -> String {
    "formmain_push".into()
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            jobcode: default_jobcode_table(),
            alerts: default_alerts_table(),
            failed_push: default_failed_push_table(),
        }
    }
}

impl Db {
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SecondaryMySql {
    /// Connection block for the gateway, sharing the primary's timeout.
    pub fn as_db(&self, connect_timeout_secs: u64) -> Db {
        Db {
            driver: Backend::MySql,
            sqlite_path: String::new(),
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            connect_timeout_secs,
        }
    }
}

impl Robot {
    /// Split the `|` separated mention list, dropping blanks.
    pub fn mentioned(&self) -> Vec<String> {
        self.mentioned_list
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Settings {
    /// The robot block, if it carries a usable webhook.
    pub fn webhook(&self) -> Option<&Robot> {
        self.robot.as_ref().filter(|r| !r.webhook.trim().is_empty())
    }

    /// The secondary MySQL block, if present and enabled.
    pub fn secondary(&self) -> Option<&SecondaryMySql> {
        self.mysql.as_ref().filter(|m| m.enabled)
    }
}

/// Load configuration from a YAML file and validate it.
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("config file not found: {}", path.display()),
        )));
    }
    let content = fs::read_to_string(path)?;
    let cfg: Settings = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Settings) -> Result<(), ConfigError> {
    match cfg.db.driver {
        Backend::Sqlite => {
            if cfg.db.sqlite_path.trim().is_empty() {
                return Err(ConfigError::Invalid("db.sqlite_path must be non-empty for sqlite"));
            }
        }
        Backend::SqlServer | Backend::MySql => {
            if cfg.db.host.trim().is_empty() {
                return Err(ConfigError::Invalid("db.host must be non-empty"));
            }
            if cfg.db.database.trim().is_empty() {
                return Err(ConfigError::Invalid("db.database must be non-empty"));
            }
            if cfg.db.user.trim().is_empty() {
                return Err(ConfigError::Invalid("db.user must be non-empty"));
            }
        }
    }
    if cfg.db.connect_timeout_secs == 0 {
        return Err(ConfigError::Invalid("db.connect_timeout_secs must be > 0"));
    }

    if let Some(m) = cfg.secondary() {
        if m.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mysql.host must be non-empty when enabled"));
        }
        if m.database.trim().is_empty() {
            return Err(ConfigError::Invalid("mysql.database must be non-empty when enabled"));
        }
    }

    // App push is the fallback channel, so its credentials matter only without a webhook.
    if cfg.webhook().is_none() {
        if cfg.wecom.corpid.trim().is_empty() {
            return Err(ConfigError::Invalid("wecom.corpid must be non-empty"));
        }
        if cfg.wecom.corpsecret.trim().is_empty() {
            return Err(ConfigError::Invalid("wecom.corpsecret must be non-empty"));
        }
        if cfg.wecom.agentid <= 0 {
            return Err(ConfigError::Invalid("wecom.agentid must be > 0"));
        }
        if cfg.wecom.touser.trim().is_empty() {
            return Err(ConfigError::Invalid("wecom.touser must be non-empty"));
        }
    }

    for table in [&cfg.tables.jobcode, &cfg.tables.alerts, &cfg.tables.failed_push] {
        if !IDENT.is_match(table) {
            return Err(ConfigError::Invalid("tables.* must be plain SQL identifiers"));
        }
    }

    Ok(())
}

/// Example document kept in sync with `config.example.yaml`.
pub fn example() -> &'static str {
    r###"wecom:
  corpid: "YOUR_CORP_ID"
  corpsecret: "YOUR_APP_SECRET"
  agentid: 1000002
  touser: "zhangsan|lisi"

db:
  driver: sqlite
  sqlite_path: "./data/demo.sqlite"
  connect_timeout_secs: 8

mysql:
  enabled: false
  host: "127.0.0.1"
  port: 3306
  database: "oa"
  user: "reader"
  password: "secret"

message:
  title_markdown: "## 数据库告警：{count} 条"

robot:
  webhook: "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=YOUR_KEY"
  mentioned_list: "@all| zhangsan |"
  format: markdown

tables:
  jobcode: bd_jobbasfil
"###
}
