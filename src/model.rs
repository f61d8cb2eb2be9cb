use serde::{Deserialize, Serialize};

/// Database backend selected by `db.driver`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    SqlServer,
    MySql,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::SqlServer => "sqlserver",
            Backend::MySql => "mysql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Backend::Sqlite => 0,
            Backend::SqlServer => 1433,
            Backend::MySql => 3306,
        }
    }
}

/// Rendering of an outgoing message.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    #[default]
    Markdown,
}

impl OutputFormat {
    /// Case-insensitive; anything other than `markdown` is plain text.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("markdown") {
            OutputFormat::Markdown
        } else {
            OutputFormat::Text
        }
    }
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(OutputFormat::parse_lenient(&raw))
    }
}

/// Exposes a row's columns by name for template substitution.
pub trait Fields {
    fn field(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobcodeRow {
    pub jobcode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateJobcode {
    pub jobcode: String,
    pub dup_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedPush {
    pub field0001: String,
    pub field0045: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRow {
    pub id: i64,
    pub title: String,
    pub created_at: String,
}

impl Fields for JobcodeRow {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "jobcode" => Some(self.jobcode.clone()),
            _ => None,
        }
    }
}

impl Fields for DuplicateJobcode {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "jobcode" => Some(self.jobcode.clone()),
            "dup_count" => Some(self.dup_count.to_string()),
            _ => None,
        }
    }
}

impl Fields for FailedPush {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "field0001" => Some(self.field0001.clone()),
            "field0045" => Some(self.field0045.clone()),
            _ => None,
        }
    }
}

impl Fields for NewRow {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "title" => Some(self.title.clone()),
            "created_at" => Some(self.created_at.clone()),
            _ => None,
        }
    }
}
