//! Command-line surface

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::request::{parse_host_path, COPY_KEYWORD};

#[derive(Parser, Debug)]
#[command(
    name = "sshw",
    author,
    version,
    about = "sshw - pick a host, log in, or copy a single file over ssh"
)]
pub struct Args {
    /// Host name, alias or address to log into; or `scp <src> [dst]`
    pub args: Vec<String>,

    /// Read hosts from ~/.ssh/config instead of the sshw config
    #[arg(short = 's', long = "ssh-config")]
    pub ssh_config: bool,

    /// Path to the host config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Append transfer and login events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Hide the progress bar and the success message
    #[arg(short, long)]
    pub quiet: bool,
}

/// What the positional arguments ask for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// No arguments: pick a host, then log in
    Pick,
    /// Log straight into the named host
    Login(String),
    /// Full `scp <src> <dst>` command line
    Copy(String),
    /// Local file only: pick a host and ask for the remote path
    PickCopy(String),
}

impl Args {
    pub fn invocation(&self) -> Result<Invocation> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            [] => Ok(Invocation::Pick),
            [kw, src, dst] if *kw == COPY_KEYWORD => {
                Ok(Invocation::Copy(format!("{} {} {}", COPY_KEYWORD, src, dst)))
            }
            [kw, src] if *kw == COPY_KEYWORD => {
                if parse_host_path(src).0.is_some() {
                    Ok(Invocation::Copy(format!("{} {} ./", COPY_KEYWORD, src)))
                } else {
                    Ok(Invocation::PickCopy(src.to_string()))
                }
            }
            [kw, ..] if *kw == COPY_KEYWORD => {
                bail!("usage: sshw scp <src> [dst]")
            }
            [host] => Ok(Invocation::Login(host.to_string())),
            _ => bail!("expected a single host, or `scp <src> [dst]`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(argv: &[&str]) -> Result<Invocation> {
        Args::try_parse_from(argv).unwrap().invocation()
    }

    #[test]
    fn test_no_args_picks() {
        assert_eq!(invocation(&["sshw"]).unwrap(), Invocation::Pick);
    }

    #[test]
    fn test_single_host_logs_in() {
        assert_eq!(
            invocation(&["sshw", "-s", "web"]).unwrap(),
            Invocation::Login("web".into())
        );
    }

    #[test]
    fn test_copy_forms() {
        assert_eq!(
            invocation(&["sshw", "scp", "a.txt", "web:/tmp/"]).unwrap(),
            Invocation::Copy("scp a.txt web:/tmp/".into())
        );
        assert_eq!(
            invocation(&["sshw", "scp", "web:/etc/hosts"]).unwrap(),
            Invocation::Copy("scp web:/etc/hosts ./".into())
        );
        assert_eq!(
            invocation(&["sshw", "-q", "scp", "a.txt"]).unwrap(),
            Invocation::PickCopy("a.txt".into())
        );
    }

    #[test]
    fn test_rejects_extra_args() {
        assert!(invocation(&["sshw", "web", "db"]).is_err());
        assert!(invocation(&["sshw", "scp"]).is_err());
        assert!(invocation(&["sshw", "scp", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "sshw",
            "--config",
            "/tmp/hosts.toml",
            "--log-file",
            "/tmp/sshw.log",
            "web",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/hosts.toml")));
        assert_eq!(args.log_file, Some(PathBuf::from("/tmp/sshw.log")));
        assert!(!args.ssh_config);
        assert!(!args.quiet);
    }
}
