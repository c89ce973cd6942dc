//! Output formatting for CLI results
//!
//! - Table: key/value table for people
//! - JSON: one object per command for scripts
//! - Quiet: nothing but the exit code

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::{Map, Value};

use crate::ExitCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Result of one command
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub code: ExitCode,
    pub rows: Vec<(&'static str, String)>,
}

impl Report {
    pub fn new(code: ExitCode) -> Self {
        Self {
            code,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.rows.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn render(&self, format: OutputFormat) -> Option<String> {
        match format {
            OutputFormat::Quiet => None,
            OutputFormat::Json => {
                let mut object = Map::new();
                object.insert("status".into(), Value::String(self.code.name().into()));
                for (key, value) in &self.rows {
                    object.insert((*key).into(), Value::String(value.clone()));
                }
                Some(Value::Object(object).to_string())
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                for (key, value) in &self.rows {
                    table.add_row(vec![key.to_string(), value.clone()]);
                }
                Some(table.to_string())
            }
        }
    }
}
