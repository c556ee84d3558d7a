//! Interactive login on a host
//!
//! Plain hosts hand the terminal straight to `ssh`. Hosts with callback
//! shells run `ssh -tt` behind a pipe: the callbacks are typed into the remote
//! shell first, then the local keyboard is forwarded byte for byte.

use anyhow::{bail, Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{Read, Write};
use std::process::{ChildStdin, Command, Stdio};
use std::time::Duration;

use crate::config::{CallbackShell, Node};
use crate::logger::Logger;
use crate::session::{ssh_args, SessionConfig, Tty};

/// Restores cooked mode on every exit path
struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// The `ssh` invocation used to log into `node`
pub fn login_command(node: &Node, cfg: &SessionConfig) -> Command {
    let tty = if node.callback_shells.is_empty() {
        Tty::Auto
    } else {
        Tty::Forced
    };
    let mut cmd = Command::new(&cfg.program);
    cmd.args(ssh_args(node, cfg, tty));
    cmd
}

pub fn login(node: &Node, cfg: &SessionConfig, logger: &dyn Logger) -> Result<()> {
    logger.login(&node.destination());
    let mut cmd = login_command(node, cfg);

    let status = if node.callback_shells.is_empty() {
        cmd.status()
            .with_context(|| format!("Failed to start {}", cfg.program))?
    } else {
        let mut child = cmd
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", cfg.program))?;
        let stdin = child
            .stdin
            .take()
            .context("ssh stdin was not captured")?;

        enable_raw_mode().context("Failed to switch terminal to raw mode")?;
        let _guard = RawModeGuard;
        let shells = node.callback_shells.clone();
        // Never joined: it stays blocked on the keyboard after ssh exits
        std::thread::spawn(move || feed_stdin(stdin, &shells));

        child.wait().context("Failed to wait for ssh")?
    };

    if !status.success() {
        bail!("ssh to {} exited with {}", node.destination(), status);
    }
    Ok(())
}

fn feed_stdin(mut stdin: ChildStdin, shells: &[CallbackShell]) {
    if write_callbacks(&mut stdin, shells, std::thread::sleep).is_err() {
        return;
    }
    let mut keyboard = std::io::stdin();
    let mut buf = [0u8; 1024];
    loop {
        match keyboard.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stdin.write_all(&buf[..n]).and_then(|_| stdin.flush()).is_err() {
                    return;
                }
            }
        }
    }
}

/// Type each callback after its delay; commands end in `\r` as if entered
fn write_callbacks<W: Write>(
    w: &mut W,
    shells: &[CallbackShell],
    mut sleep: impl FnMut(Duration),
) -> std::io::Result<()> {
    for shell in shells {
        sleep(Duration::from_millis(shell.delay_ms));
        w.write_all(shell.cmd.as_bytes())?;
        w.write_all(b"\r")?;
        w.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(shells: Vec<CallbackShell>) -> Node {
        Node {
            name: "web".into(),
            host: "10.0.0.5".into(),
            user: Some("deploy".into()),
            callback_shells: shells,
            ..Default::default()
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_plain_login_lets_ssh_pick_tty() {
        let cmd = login_command(&node(vec![]), &SessionConfig::default());
        let args = args_of(&cmd);
        assert_eq!(cmd.get_program(), "ssh");
        assert!(!args.iter().any(|a| a == "-T" || a == "-tt"));
        assert_eq!(args.last().map(String::as_str), Some("deploy@10.0.0.5"));
    }

    #[test]
    fn test_callback_login_forces_tty() {
        let shells = vec![CallbackShell {
            cmd: "cd /srv".into(),
            delay_ms: 0,
        }];
        let args = args_of(&login_command(&node(shells), &SessionConfig::default()));
        assert_eq!(args.first().map(String::as_str), Some("-tt"));
    }

    #[test]
    fn test_write_callbacks_in_order_with_delays() {
        let shells = vec![
            CallbackShell {
                cmd: "sudo -i".into(),
                delay_ms: 500,
            },
            CallbackShell {
                cmd: "cd /srv".into(),
                delay_ms: 20,
            },
        ];
        let mut out = Vec::new();
        let mut slept = Vec::new();
        write_callbacks(&mut out, &shells, |d| slept.push(d)).unwrap();
        assert_eq!(out, b"sudo -i\rcd /srv\r");
        assert_eq!(
            slept,
            vec![Duration::from_millis(500), Duration::from_millis(20)]
        );
    }
}
