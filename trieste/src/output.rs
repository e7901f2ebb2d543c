//! Output formatting for CLI commands.
//!
//! Every command writes either human-readable text or a single JSON document.

use anyhow::Result;
use serde::Serialize;
use std::io::{self, Write};
use trieste_core::{Hash, NodeView, PathRecord, TrieStats};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// `text_fn` is only called in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write raw bytes to stdout, bypassing formatting.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut handle = self.stdout.lock();
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }

    /// Write an error to stderr.
    ///
    /// In JSON mode this is an object with `success: false`.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// One stored file.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub length: usize,
    pub digest: Hash,
    /// Number of nodes the file's content spans, the root included.
    pub nodes: usize,
}

impl FileInfo {
    pub fn new(name: String, record: &PathRecord) -> Self {
        Self {
            name,
            length: record.length,
            digest: record.digest,
            nodes: record.path.len() + 1,
        }
    }
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub files: Vec<FileInfo>,
}

/// Output for `cat --json`.
#[derive(Debug, Serialize)]
pub struct CatOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub length: usize,
    /// Content decoded as UTF-8, invalid sequences replaced.
    pub content: String,
}

/// Output for `search` command.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub success: bool,
    pub result_code: u8,
    pub prefix: String,
    pub matches: Vec<FileInfo>,
}

/// Output for `stats` command.
#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub stats: TrieStats,
    pub saved_bytes: usize,
}

/// Output for `tree` command.
#[derive(Debug, Serialize)]
pub struct TreeOutput {
    pub success: bool,
    pub result_code: u8,
    pub node_count: usize,
    pub root: NodeView,
}

/// Output for `check` command.
#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub success: bool,
    pub result_code: u8,
    pub files: usize,
    pub nodes: usize,
}
