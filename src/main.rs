//! sshw - ssh host picker with single-file scp
//!
//! `sshw` picks a host and logs in, `sshw <host>` logs in directly and
//! `sshw scp <src> [dst]` copies one file to or from a host.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sshw::cli::{Args, Invocation};
use sshw::config::{self, Config, Node};
use sshw::history;
use sshw::logger::{Logger, NoopLogger, TextLogger};
use sshw::login::login;
use sshw::progress::{BarProgress, ProgressObserver};
use sshw::request::TransferRequest;
use sshw::session::SshSession;
use sshw::transfer::{ProgressFactory, Transfer};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let invocation = args.invocation()?;
    let config = load_config(&args)?;

    // Choose logger once; NoopLogger when no log file was asked for
    let logger: Arc<dyn Logger> = match args.log_file {
        Some(ref p) => match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {:#}", p.display(), e);
                Arc::new(NoopLogger)
            }
        },
        None => Arc::new(NoopLogger),
    };

    match invocation {
        Invocation::Pick => match sshw::tui::pick(&config.hosts)? {
            Some(node) => {
                record_history(&history::login_entry(&node));
                login(&node, &config.session, logger.as_ref())
            }
            None => Ok(()),
        },
        Invocation::Login(token) => {
            let node = config::resolve(&config.hosts, &token)
                .ok_or_else(|| anyhow!("host not found: {}", token))?;
            login(&node, &config.session, logger.as_ref())
        }
        Invocation::Copy(cmd) => {
            let req = TransferRequest::parse(&cmd)?;
            let node = config::resolve(&config.hosts, req.remote_host())
                .ok_or_else(|| anyhow!("host not found: {}", req.remote_host()))?;
            copy(&args, &config, node, &req, logger)
        }
        Invocation::PickCopy(local) => {
            let Some(node) = sshw::tui::pick(&config.hosts)? else {
                return Ok(());
            };
            let remote = prompt_remote_path(&node)?;
            let req = TransferRequest::parse(&history::copy_entry(&local, &node, &remote))?;
            copy(&args, &config, node, &req, logger)?;
            record_history(&req.to_command());
            Ok(())
        }
    }
}

fn record_history(cmd: &str) {
    if let Err(e) = history::record(cmd) {
        eprintln!("warning: {:#}", e);
    }
}

fn load_config(args: &Args) -> Result<Config> {
    if args.ssh_config {
        return Config::load_ssh_config(&config::default_ssh_config_path());
    }
    let path: PathBuf = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    Config::load(&path)
}

/// Ask for the remote path; an empty answer means the remote home directory
fn prompt_remote_path(node: &Node) -> Result<String> {
    eprint!("remote path on {} (default ~/): ", node.name);
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read remote path")?;
    let path = line.trim();
    Ok(if path.is_empty() {
        "~/".to_string()
    } else {
        path.to_string()
    })
}

fn copy(
    args: &Args,
    config: &Config,
    node: Node,
    req: &TransferRequest,
    logger: Arc<dyn Logger>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user (Ctrl-C)");
        on_signal.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    let show_bar = !args.quiet && std::io::stderr().is_terminal();
    let progress: ProgressFactory = Arc::new(move |total: u64, label: &str| {
        if show_bar {
            Arc::new(BarProgress::new(total, label)) as Arc<dyn ProgressObserver>
        } else {
            Arc::new(BarProgress::hidden()) as Arc<dyn ProgressObserver>
        }
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let transfer = Transfer::new(cancel)
        .with_logger(logger)
        .with_progress(progress);
    let mut session = SshSession::new(node, config.session.clone());
    runtime
        .block_on(transfer.run(&mut session, req))
        .with_context(|| format!("{} failed", req.to_command()))?;

    if !args.quiet {
        println!("copy file success");
    }
    Ok(())
}
