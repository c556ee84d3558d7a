//! Host tree configuration
//!
//! Hosts come from a TOML file (`[[host]]` tables, nested through
//! `children`) or from the user's `~/.ssh/config`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::session::SessionConfig;

/// Command typed into the shell after login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackShell {
    pub cmd: String,
    #[serde(default)]
    pub delay_ms: u64,
}

/// One entry of the host tree. A node with children is a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callback_shells: Vec<CallbackShell>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jump: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    /// `user@host` or bare `host`
    pub fn destination(&self) -> String {
        match self.user {
            Some(ref u) if !u.is_empty() => format!("{}@{}", u, self.host),
            _ => self.host.clone(),
        }
    }

    /// `[user@]host[:port]` as accepted by `ssh -J`
    pub fn jump_spec(&self) -> String {
        match self.port {
            Some(p) => format!("{}:{}", self.destination(), p),
            None => self.destination(),
        }
    }

    /// Text the picker matches search keywords against
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.name,
            self.user.as_deref().unwrap_or(""),
            self.host
        )
    }
}

/// Top-level config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    #[serde(rename = "host")]
    pub hosts: Vec<Node>,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse host config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Hosts from `~/.ssh/config`, default session settings
    pub fn load_ssh_config(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ssh config: {}", path.display()))?;
        Ok(Self {
            session: SessionConfig::default(),
            hosts: parse_ssh_config(&text),
        })
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        if let Ok(p) = std::env::var("USERPROFILE") {
            return Some(PathBuf::from(p));
        }
    }
    std::env::var("HOME").ok().map(PathBuf::from)
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("sshw");
        }
    }
    match home_dir() {
        Some(home) => home.join(".config").join("sshw"),
        None => PathBuf::from(".sshw"),
    }
}

/// `$SSHW_CONFIG`, else `~/.config/sshw/config.toml`, else `~/.sshw.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("SSHW_CONFIG") {
        return PathBuf::from(p);
    }
    let primary = config_dir().join("config.toml");
    if primary.exists() {
        return primary;
    }
    match home_dir() {
        Some(home) if home.join(".sshw.toml").exists() => home.join(".sshw.toml"),
        _ => primary,
    }
}

pub fn default_ssh_config_path() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("config")
}

/// Parse the subset of ssh_config that maps onto [`Node`]. Wildcard
/// patterns and `Match` blocks are skipped.
pub fn parse_ssh_config(text: &str) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    // indices into `out` the current Host block applies to
    let mut current: Vec<usize> = Vec::new();

    for raw in text.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once(|c: char| c.is_whitespace() || c == '=') {
            Some((k, v)) => (k.trim(), v.trim().trim_start_matches('=').trim()),
            None => continue,
        };
        let value = value.trim_matches('"');

        match key.to_ascii_lowercase().as_str() {
            "host" => {
                current.clear();
                for pattern in value.split_whitespace() {
                    if pattern.contains(['*', '?', '!']) {
                        continue;
                    }
                    current.push(out.len());
                    out.push(Node {
                        name: pattern.to_string(),
                        host: pattern.to_string(),
                        ..Node::default()
                    });
                }
            }
            "match" => current.clear(),
            "hostname" => apply(&mut out, &current, |n| n.host = value.to_string()),
            "user" => apply(&mut out, &current, |n| n.user = Some(value.to_string())),
            "port" => {
                if let Ok(p) = value.parse::<u16>() {
                    apply(&mut out, &current, |n| n.port = Some(p));
                }
            }
            "identityfile" => apply(&mut out, &current, |n| n.identity_file = Some(value.to_string())),
            "proxyjump" if !value.eq_ignore_ascii_case("none") => {
                let hops: Vec<Node> = value.split(',').map(|h| parse_jump(h.trim())).collect();
                apply(&mut out, &current, |n| n.jump = hops.clone());
            }
            _ => {}
        }
    }
    out
}

fn apply(nodes: &mut [Node], idx: &[usize], mut f: impl FnMut(&mut Node)) {
    for &i in idx {
        if let Some(n) = nodes.get_mut(i) {
            f(n);
        }
    }
}

fn parse_jump(spec: &str) -> Node {
    let (user, rest) = match spec.split_once('@') {
        Some((u, r)) => (Some(u.to_string()), r),
        None => (None, spec),
    };
    let (host, port) = match rest.rsplit_once(':') {
        Some((h, p)) => match p.parse::<u16>() {
            Ok(port) => (h, Some(port)),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };
    Node {
        name: host.to_string(),
        host: host.to_string(),
        user,
        port,
        ..Node::default()
    }
}

fn find_by<'a>(nodes: &'a [Node], pred: &dyn Fn(&Node) -> bool) -> Option<&'a Node> {
    for node in nodes {
        if pred(node) {
            return Some(node);
        }
        if let Some(found) = find_by(&node.children, pred) {
            return Some(found);
        }
    }
    None
}

pub fn find_name<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Node> {
    find_by(nodes, &|n| n.name == name)
}

pub fn find_alias<'a>(nodes: &'a [Node], alias: &str) -> Option<&'a Node> {
    find_by(nodes, &|n| n.alias.as_deref() == Some(alias))
}

pub fn find_host<'a>(nodes: &'a [Node], host: &str) -> Option<&'a Node> {
    find_by(nodes, &|n| !n.is_group() && n.host == host)
}

/// Whole-tree lookup: every name first, then aliases, then addresses
pub fn find_node<'a>(nodes: &'a [Node], key: &str) -> Option<&'a Node> {
    find_name(nodes, key)
        .or_else(|| find_alias(nodes, key))
        .or_else(|| find_host(nodes, key))
}

/// Resolve a `[user@]key` token from the command line. An explicit user
/// overrides the configured one.
pub fn resolve(nodes: &[Node], token: &str) -> Option<Node> {
    if let Some(n) = find_node(nodes, token) {
        return Some(n.clone());
    }
    let (user, key) = token.split_once('@')?;
    let mut n = find_node(nodes, key)?.clone();
    n.user = Some(user.to_string());
    Some(n)
}
