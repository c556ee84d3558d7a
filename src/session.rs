//! Remote command channel
//!
//! A [`Session`] runs exactly one remote command and hands back its stdin,
//! its stdout and a completion future. [`SshSession`] provides that by
//! spawning the system `ssh` client, which owns authentication, key loading
//! and jump-host proxying.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::Node;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ExitFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

/// A started remote command
pub struct RemoteCommand {
    /// Feeds the remote command's standard input
    pub stdin: BoxedWriter,
    /// Drains the remote command's standard output
    pub stdout: BoxedReader,
    /// Resolves once the remote command exits; `Err` for a failed status
    pub exit: ExitFuture,
}

pub trait Session: Send {
    fn exec(&mut self, command: &str) -> io::Result<RemoteCommand>;
}

/// Connection settings shared by every session. Built once from the config
/// file and passed in; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// ssh client binary
    pub program: String,
    /// Ordered cipher preference list; empty keeps the client's defaults
    pub ciphers: Vec<String>,
    pub connect_timeout_secs: u64,
    pub keepalive_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            ciphers: Vec::new(),
            connect_timeout_secs: 10,
            keepalive_secs: 10,
        }
    }
}

/// How the ssh client should treat the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tty {
    /// `-T`: binary-clean channel for scp
    Disabled,
    /// Default allocation for an interactive shell
    Auto,
    /// `-tt`: force a pty even though stdin is a pipe
    Forced,
}

/// Build the ssh argument list for `node`, excluding the remote command
pub fn ssh_args(node: &Node, cfg: &SessionConfig, tty: Tty) -> Vec<String> {
    let mut args = Vec::new();
    match tty {
        Tty::Disabled => args.push("-T".to_string()),
        Tty::Auto => {}
        Tty::Forced => args.push("-tt".to_string()),
    }
    args.push("-o".to_string());
    args.push(format!("ConnectTimeout={}", cfg.connect_timeout_secs));
    if cfg.keepalive_secs > 0 {
        args.push("-o".to_string());
        args.push(format!("ServerAliveInterval={}", cfg.keepalive_secs));
    }
    if !cfg.ciphers.is_empty() {
        args.push("-c".to_string());
        args.push(cfg.ciphers.join(","));
    }
    if let Some(port) = node.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(ref key) = node.identity_file {
        args.push("-i".to_string());
        args.push(key.clone());
    }
    if !node.jump.is_empty() {
        let hops: Vec<String> = node.jump.iter().map(Node::jump_spec).collect();
        args.push("-J".to_string());
        args.push(hops.join(","));
    }
    args.push(node.destination());
    args
}

/// Session backed by an `ssh` child process
pub struct SshSession {
    node: Node,
    config: SessionConfig,
    used: bool,
}

impl SshSession {
    pub fn new(node: Node, config: SessionConfig) -> Self {
        Self {
            node,
            config,
            used: false,
        }
    }
}

impl Session for SshSession {
    fn exec(&mut self, command: &str) -> io::Result<RemoteCommand> {
        if self.used {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "session already ran a command",
            ));
        }
        self.used = true;

        let mut child = tokio::process::Command::new(&self.config.program)
            .args(ssh_args(&self.node, &self.config, Tty::Disabled))
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()?;

        let missing = |what: &str| io::Error::new(io::ErrorKind::BrokenPipe, format!("ssh {what} not captured"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let program = self.config.program.clone();

        let exit: ExitFuture = Box::pin(async move {
            let status = child.wait().await?;
            if status.success() {
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} exited with {}", program, status),
                ))
            }
        });

        Ok(RemoteCommand {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            exit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str) -> Node {
        Node {
            name: host.to_string(),
            host: host.to_string(),
            ..Node::default()
        }
    }

    #[test]
    fn test_args_minimal() {
        let args = ssh_args(&node("10.0.0.5"), &SessionConfig::default(), Tty::Disabled);
        assert_eq!(
            args,
            vec![
                "-T",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "ServerAliveInterval=10",
                "10.0.0.5"
            ]
        );
    }

    #[test]
    fn test_args_full() {
        let mut n = node("db.internal");
        n.user = Some("deploy".into());
        n.port = Some(2222);
        n.identity_file = Some("/keys/id_ed25519".into());
        let mut bastion = node("bastion.example.com");
        bastion.user = Some("ops".into());
        bastion.port = Some(22);
        n.jump = vec![bastion, node("hop2")];
        let cfg = SessionConfig {
            ciphers: vec!["aes128-ctr".into(), "aes256-ctr".into()],
            keepalive_secs: 0,
            ..SessionConfig::default()
        };

        let args = ssh_args(&n, &cfg, Tty::Forced);
        assert_eq!(
            args,
            vec![
                "-tt",
                "-o",
                "ConnectTimeout=10",
                "-c",
                "aes128-ctr,aes256-ctr",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "-J",
                "ops@bastion.example.com:22,hop2",
                "deploy@db.internal",
            ]
        );
    }

    #[test]
    fn test_session_runs_one_command() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            // `true` ignores its arguments and exits 0
            let cfg = SessionConfig {
                program: "true".into(),
                ..SessionConfig::default()
            };
            let mut s = SshSession::new(node("localhost"), cfg);
            let cmd = s.exec("scp -f x");
            if let Ok(cmd) = cmd {
                assert!(cmd.exit.await.is_ok());
                assert!(s.exec("scp -f y").is_err());
            }
        });
    }
}
