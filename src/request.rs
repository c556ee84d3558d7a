//! `scp <source> <target>` parsing and validation
//!
//! Each endpoint is `[host:]path`. Exactly one side must be remote; the source
//! must name a file. A directory-style target is completed with the source's
//! basename, and a leading `~` on the remote path becomes `.` since some scp
//! builds refuse a literal tilde.

use crate::error::{Result, ScpError};

pub const COPY_KEYWORD: &str = "scp";

/// Which path endings count as "this names a directory"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectorySuffixes {
    /// Trailing `/`, or a cleaned basename of `.`, `..`, `~` or `/`
    #[default]
    Broad,
    /// Trailing `/` or the root only
    SlashOnly,
}

impl DirectorySuffixes {
    pub fn is_dir_ref(self, path: &str) -> bool {
        if path.ends_with('/') {
            return true;
        }
        let cleaned = clean(path);
        match self {
            DirectorySuffixes::Broad => matches!(base(&cleaned), "." | ".." | "~" | "/"),
            DirectorySuffixes::SlashOnly => cleaned == "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local source, remote target
    Upload,
    /// Remote source, local target
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_path: String,
    pub source_host: Option<String>,
    pub target_path: String,
    pub target_host: Option<String>,
}

impl TransferRequest {
    /// Parse and validate with the default suffix rule
    pub fn parse(command: &str) -> Result<Self> {
        Self::parse_with(command, DirectorySuffixes::default())
    }

    pub fn parse_with(command: &str, suffixes: DirectorySuffixes) -> Result<Self> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        if tokens.len() != 3 || tokens[0] != COPY_KEYWORD {
            return Err(ScpError::MalformedCommand(command.to_string()));
        }

        let (source_host, source_path) = parse_host_path(tokens[1]);
        let (target_host, target_path) = parse_host_path(tokens[2]);
        let mut req = TransferRequest {
            source_path,
            source_host,
            target_path,
            target_host,
        };
        req.validate_with(suffixes)?;
        Ok(req)
    }

    pub fn validate(&mut self) -> Result<()> {
        self.validate_with(DirectorySuffixes::default())
    }

    /// Check the endpoint invariants and apply the path rewrites. Running it
    /// again on its own output changes nothing.
    pub fn validate_with(&mut self, suffixes: DirectorySuffixes) -> Result<()> {
        if self.source_host.is_some() == self.target_host.is_some() {
            return Err(ScpError::AmbiguousEndpoints);
        }
        if self.source_path.is_empty() || self.target_path.is_empty() {
            return Err(ScpError::EmptyPath);
        }
        if suffixes.is_dir_ref(&self.source_path) {
            return Err(ScpError::DirectoryUnsupported(self.source_path.clone()));
        }

        if suffixes.is_dir_ref(&self.target_path) {
            let name = base(&clean(&self.source_path)).to_string();
            self.target_path = join(&clean(&self.target_path), &name);
        }

        if self.source_host.is_some() {
            self.source_path = expand_remote_home(&self.source_path);
        } else {
            self.target_path = expand_remote_home(&self.target_path);
        }
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        if self.source_host.is_some() {
            Direction::Download
        } else {
            Direction::Upload
        }
    }

    /// Host token of the remote side (may carry a `user@` prefix)
    pub fn remote_host(&self) -> &str {
        self.source_host
            .as_deref()
            .or(self.target_host.as_deref())
            .unwrap_or_default()
    }

    pub fn remote_path(&self) -> &str {
        match self.direction() {
            Direction::Download => &self.source_path,
            Direction::Upload => &self.target_path,
        }
    }

    pub fn local_path(&self) -> &str {
        match self.direction() {
            Direction::Download => &self.target_path,
            Direction::Upload => &self.source_path,
        }
    }

    /// Render back into the `scp src dst` form
    pub fn to_command(&self) -> String {
        let side = |host: &Option<String>, path: &str| match host {
            Some(h) => format!("{}:{}", h, path),
            None => path.to_string(),
        };
        format!(
            "{} {} {}",
            COPY_KEYWORD,
            side(&self.source_host, &self.source_path),
            side(&self.target_host, &self.target_path)
        )
    }
}

/// Split `host:path` on the first colon. No colon (or an empty host) means a
/// local path.
pub fn parse_host_path(token: &str) -> (Option<String>, String) {
    match token.split_once(':') {
        Some((host, path)) if !host.is_empty() => (Some(host.to_string()), normalize_path(path)),
        Some((_, path)) => (None, normalize_path(path)),
        None => (None, normalize_path(token)),
    }
}

/// Lexically clean a path and anchor relative ones at `./`. A trailing slash
/// survives so directory references stay recognisable.
pub fn normalize_path(s: &str) -> String {
    if s.is_empty() || s == "." || s == "./" {
        return "./".to_string();
    }
    let trailing = s.len() > 1 && s.ends_with('/');
    let mut cs = clean(s);
    if !(cs.starts_with("./") || cs.starts_with('/') || cs.starts_with('~')) {
        cs = format!("./{}", cs);
    }
    if trailing && !cs.ends_with('/') {
        cs.push('/');
    }
    cs
}

/// Lexical path cleaning: collapse separators, drop `.`, resolve `..`
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            c => parts.push(c),
        }
    }
    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Last element of an already cleaned path
pub fn base(cleaned: &str) -> &str {
    if cleaned == "/" {
        return "/";
    }
    cleaned.rsplit('/').next().unwrap_or(cleaned)
}

fn join(dir: &str, name: &str) -> String {
    if dir == "." {
        format!("./{}", name)
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn expand_remote_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        format!(".{}", &path[1..])
    } else {
        path.to_string()
    }
}
