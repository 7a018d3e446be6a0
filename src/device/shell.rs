//! Command lines for the device shell and bounded execution of them.

use crate::model::Transport;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::process::{Output, Stdio};
use std::time::Duration;

/// A program and its arguments. The program is never empty by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShellCommand {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
}

impl ShellCommand {
    pub(crate) fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub(crate) fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        cmd
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Wraps a device-side `program args...` for the transport, optionally under `su -c`.
pub(crate) fn command_for<S: AsRef<str>>(
    transport: &Transport,
    use_root: bool,
    program: &str,
    args: &[S],
) -> ShellCommand {
    let args: Vec<String> = args.iter().map(|s| s.as_ref().to_string()).collect();
    let joined = || {
        std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    };
    match transport {
        Transport::Local if use_root => ShellCommand::new("su", vec!["-c".to_string(), joined()]),
        Transport::Local => ShellCommand::new(program, args.clone()),
        Transport::Adb { serial } => {
            let mut adb = Vec::new();
            if let Some(serial) = serial {
                adb.push("-s".to_string());
                adb.push(serial.clone());
            }
            adb.push("shell".to_string());
            if use_root {
                // adb joins shell arguments with spaces, so the su payload needs its own quotes.
                adb.push("su".to_string());
                adb.push("-c".to_string());
                adb.push(format!("'{}'", joined()));
            } else {
                adb.push(program.to_string());
                adb.extend(args.iter().cloned());
            }
            ShellCommand::new("adb", adb)
        }
    }
}

/// A complete command line for the root shell.
pub(crate) fn root_line(transport: &Transport, line: &str) -> ShellCommand {
    command_for::<&str>(transport, true, line, &[])
}

/// Runs a command to completion within `limit`, whatever its exit status.
pub(crate) async fn run_captured(cmd: &ShellCommand, limit: Duration) -> Result<Output> {
    let mut command = cmd.to_tokio();
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = command.output();
    let program = &cmd.program;
    tokio::time::timeout(limit, child)
        .await
        .with_context(|| format!("`{program}` timed out after {}", humantime::format_duration(limit)))?
        .with_context(|| format!("failed to start `{program}`"))
}

/// Like [`run_captured`], but a non-zero exit is an error. Returns stdout.
pub(crate) async fn run_bounded(cmd: &ShellCommand, limit: Duration) -> Result<String> {
    let out = run_captured(cmd, limit).await?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        bail!("`{}` exited with {}: {}", cmd.program, out.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}
