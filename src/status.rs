use std::path::Path;

use chrono::DateTime;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::tool::{PijulTool, ToolError};

/// Marker `pijul channel` puts in front of the current channel.
const CURRENT_CHANNEL_MARKER: char = '*';
/// Width of the `* ` prefix in front of a channel name.
const CHANNEL_PREFIX_WIDTH: usize = 2;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Unexpected pijul output: {0}")]
    MalformedOutput(String),
    #[error("Could not parse timestamp `{timestamp}`: {reason}")]
    MalformedTimestamp { timestamp: String, reason: String },
}

/// What a freshly cloned working copy reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    pub channel: String,
    pub state: String,
    pub last_modified: u64,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    timestamp: String,
    state: String,
}

pub fn get_repo_status<T: PijulTool>(tool: &T, repo: &Path) -> Result<RepoStatus, StatusError> {
    let (state, last_modified) = get_state(tool, repo)?;
    let channel = get_channel(tool, repo)?;
    debug!(
        "Repository at {} is on channel {} at state {}",
        repo.display(),
        channel,
        state
    );
    Ok(RepoStatus {
        channel,
        state,
        last_modified,
    })
}

fn get_state<T: PijulTool>(tool: &T, repo: &Path) -> Result<(String, u64), StatusError> {
    let args = ["log", "--output-format", "json", "--state", "--limit", "1"].map(String::from);
    let output = tool.run(&args, Some(repo), None)?;
    parse_log(&output)
}

fn get_channel<T: PijulTool>(tool: &T, repo: &Path) -> Result<String, StatusError> {
    let output = tool.run(&["channel".to_owned()], Some(repo), None)?;
    parse_channel(&output)
}

fn parse_log(output: &str) -> Result<(String, u64), StatusError> {
    let mut entries: Vec<LogEntry> = serde_json::from_str(output)
        .map_err(|e| StatusError::MalformedOutput(format!("invalid log record: {e}")))?;
    if entries.len() != 1 {
        return Err(StatusError::MalformedOutput(format!(
            "expected exactly one log record, found {}",
            entries.len()
        )));
    }
    let LogEntry { timestamp, state } = entries.remove(0);
    let last_modified = parse_timestamp(&timestamp)?;
    Ok((state, last_modified))
}

/// Parses an RFC 3339 offset date-time into whole seconds since the epoch.
fn parse_timestamp(timestamp: &str) -> Result<u64, StatusError> {
    let malformed = |reason: String| StatusError::MalformedTimestamp {
        timestamp: timestamp.to_owned(),
        reason,
    };
    let parsed = DateTime::parse_from_rfc3339(timestamp).map_err(|e| malformed(e.to_string()))?;
    u64::try_from(parsed.timestamp()).map_err(|_| malformed("before the epoch".to_owned()))
}

fn parse_channel(output: &str) -> Result<String, StatusError> {
    let line = output
        .lines()
        .find(|line| line.starts_with(CURRENT_CHANNEL_MARKER))
        .ok_or_else(|| StatusError::MalformedOutput("no current channel marked".to_owned()))?;
    match line.get(CHANNEL_PREFIX_WIDTH..) {
        Some(channel) if !channel.is_empty() => Ok(channel.to_owned()),
        _ => Err(StatusError::MalformedOutput(format!(
            "invalid current channel line {line:?}"
        ))),
    }
}
