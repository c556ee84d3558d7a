//! Error taxonomy for the copy engine
//!
//! Validation errors surface before any session I/O. Protocol and I/O errors
//! abort the transfer; nothing here is retried.

use std::fmt;
use std::io;

/// Which step of a transfer an I/O error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LocalFile,
    CommandStart,
    HeaderExchange,
    PayloadCopy,
    Terminator,
    CommandCompletion,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::LocalFile => "local file",
            Phase::CommandStart => "command start",
            Phase::HeaderExchange => "header exchange",
            Phase::PayloadCopy => "payload copy",
            Phase::Terminator => "terminator",
            Phase::CommandCompletion => "command completion",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScpError {
    #[error("fail to parse scp syntax: {0}")]
    MalformedCommand(String),

    #[error("exactly one of source and target must name a remote host")]
    AmbiguousEndpoints,

    #[error("source and target paths must not be empty")]
    EmptyPath,

    #[error("directory transfer is not supported: {0}")]
    DirectoryUnsupported(String),

    #[error("not a regular file: {0}")]
    NotRegularFile(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("malformed file header: {0:?}")]
    MalformedHeader(String),

    #[error("remote warning: {0}")]
    RemoteWarning(String),

    #[error("remote error: {0}")]
    RemoteFatal(String),

    #[error("transfer truncated: expected {expected} bytes, got {received}")]
    TruncatedTransfer { expected: u64, received: u64 },

    #[error("remote command failed: {0}")]
    RemoteCommandFailed(String),

    #[error("{phase} failed: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },

    #[error("transfer task failed: {0}")]
    TaskFailed(String),

    #[error("transfer cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ScpError>;

/// Attach a transfer phase to raw I/O results
pub(crate) trait PhaseExt<T> {
    fn phase(self, phase: Phase) -> Result<T>;
}

impl<T> PhaseExt<T> for io::Result<T> {
    fn phase(self, phase: Phase) -> Result<T> {
        self.map_err(|source| ScpError::Io { phase, source })
    }
}
