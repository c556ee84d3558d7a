//! Shell history recording
//!
//! Commands assembled interactively (picked host, typed path) are appended to
//! the user's shell history so they can be recalled and re-run directly.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Node;
use crate::request::COPY_KEYWORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Zsh,
    Bash,
}

impl ShellKind {
    /// Detect from a `$SHELL` value; `sh` shares bash's history file
    pub fn from_shell_path(shell: &str) -> Option<Self> {
        let name = Path::new(shell).file_name()?.to_str()?;
        match name {
            "zsh" => Some(ShellKind::Zsh),
            "bash" | "sh" => Some(ShellKind::Bash),
            _ => None,
        }
    }

    pub fn history_file(self, home: &Path) -> PathBuf {
        match self {
            ShellKind::Zsh => home.join(".zsh_history"),
            ShellKind::Bash => home.join(".bash_history"),
        }
    }

    /// One history entry, newline included
    pub fn format(self, cmd: &str, now: DateTime<Utc>) -> String {
        match self {
            ShellKind::Zsh => format!(": {}:0;{}\n", now.timestamp(), cmd),
            ShellKind::Bash => format!("{}\n", cmd),
        }
    }
}

pub fn append_entry(path: &Path, kind: ShellKind, cmd: &str, now: DateTime<Utc>) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open history file {}", path.display()))?;
    f.write_all(kind.format(cmd, now).as_bytes())
        .with_context(|| format!("write history file {}", path.display()))?;
    Ok(())
}

/// Arguments that log into `node` again: its `[user@]host`, which lookup
/// resolves by address
pub fn login_entry(node: &Node) -> String {
    node.destination()
}

/// `scp <local> [user@]host:<remote>` for a host chosen in the picker
pub fn copy_entry(local: &str, node: &Node, remote: &str) -> String {
    format!("{} {} {}:{}", COPY_KEYWORD, local, node.destination(), remote)
}

/// Record `<binary> <cmd>` into the current shell's history. Unknown shells
/// are silently skipped.
pub fn record(cmd: &str) -> Result<()> {
    let shell = std::env::var("SHELL").unwrap_or_default();
    let Some(kind) = ShellKind::from_shell_path(&shell) else {
        return Ok(());
    };
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return Ok(());
    };
    let bin = std::env::args()
        .next()
        .and_then(|a| Path::new(&a).file_name().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    append_entry(
        &kind.history_file(&home),
        kind,
        &format!("{} {}", bin, cmd),
        Utc::now(),
    )
}
