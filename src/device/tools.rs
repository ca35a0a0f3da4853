//! External tool runner (dism, bcdedit, bcdboot, diskpart).
//!
//! Output is streamed line by line so long-running tools can report progress
//! while they work; both streams are kept for the error message on failure.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::DeviceError;

// DISM draws "[==========42.0%           ]" and rewrites it in place
static DISM_PROGRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[=\s]*(\d{1,3}(?:\.\d+)?)%[=\s]*\]").expect("Invalid DISM progress regex")
});

/// Extract the percentage from a DISM progress line.
pub fn parse_dism_progress(line: &str) -> Option<f32> {
    DISM_PROGRESS_REGEX
        .captures(line)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .map(|p| p.min(100.0))
}

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args`, calling `on_line` for every stdout/stderr line.
///
/// A non-zero exit is a [`DeviceError::Command`] carrying the last line the tool printed.
pub async fn run_tool<I, S, F>(program: &str, args: I, mut on_line: F) -> Result<ToolOutput, DeviceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    F: FnMut(&str) + Send,
{
    let mut command = Command::new(program);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    log::debug!("[Tools] Spawning {:?}", command.as_std());

    let mut child = command.spawn().map_err(|e| DeviceError::Command {
        cmd: program.to_string(),
        reason: format!("failed to start: {}", e),
    })?;

    let stdout = child.stdout.take().ok_or_else(|| DeviceError::Command {
        cmd: program.to_string(),
        reason: "failed to capture stdout".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| DeviceError::Command {
        cmd: program.to_string(),
        reason: "failed to capture stderr".to_string(),
    })?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut output = ToolOutput::default();
    let mut stdout_closed = false;
    let mut stderr_closed = false;

    while !(stdout_closed && stderr_closed) {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_closed => match line {
                Ok(Some(line)) => {
                    on_line(&line);
                    output.stdout.push_str(&line);
                    output.stdout.push('\n');
                }
                Ok(None) => stdout_closed = true,
                Err(e) => {
                    log::warn!("[Tools] {} stdout read error: {}", program, e);
                    stdout_closed = true;
                }
            },
            line = stderr_lines.next_line(), if !stderr_closed => match line {
                Ok(Some(line)) => {
                    on_line(&line);
                    output.stderr.push_str(&line);
                    output.stderr.push('\n');
                }
                Ok(None) => stderr_closed = true,
                Err(e) => {
                    log::warn!("[Tools] {} stderr read error: {}", program, e);
                    stderr_closed = true;
                }
            },
        }
    }

    let status = child.wait().await?;
    if status.success() {
        return Ok(output);
    }

    let last_non_empty = |text: &str| text.lines().map(str::trim).filter(|l| !l.is_empty()).last().map(str::to_string);
    let last_line = last_non_empty(&output.stderr)
        .or_else(|| last_non_empty(&output.stdout))
        .unwrap_or_else(|| "no output".to_string());
    Err(DeviceError::Command {
        cmd: program.to_string(),
        reason: match status.code() {
            Some(code) => format!("exit code {}: {}", code, last_line),
            None => format!("terminated by signal: {}", last_line),
        },
    })
}
