//! Shared protocol logic for both transfer directions
//!
//! Control replies, the `C` header line and the single-byte ack. Readers here
//! never buffer: a reply is consumed byte by byte so that payload bytes which
//! follow on the same stream are left untouched for the copy step.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Phase, PhaseExt, Result, ScpError};
use crate::protocol::{record, status, MAX_LINE_LEN};

/// Status reply read from the remote control stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Ok,
    Warning(String),
    Fatal(String),
}

impl ControlResponse {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ControlResponse::Ok)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ControlResponse::Ok => None,
            ControlResponse::Warning(m) | ControlResponse::Fatal(m) => Some(m.as_str()),
        }
    }

    /// Turn a failure reply into the matching error
    pub fn into_result(self) -> Result<()> {
        match self {
            ControlResponse::Ok => Ok(()),
            ControlResponse::Warning(m) => Err(ScpError::RemoteWarning(m)),
            ControlResponse::Fatal(m) => Err(ScpError::RemoteFatal(m)),
        }
    }
}

/// Transfer header: `C<mode> <size> <filename>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub mode: u32,
    pub size: u64,
    pub filename: String,
}

impl FileHeader {
    pub fn new(mode: u32, size: u64, filename: impl Into<String>) -> Self {
        Self {
            mode,
            size,
            filename: filename.into(),
        }
    }

    /// Encode as the wire line, trailing newline included
    pub fn encode(&self) -> String {
        format!("C{:04o} {} {}\n", self.mode & 0o7777, self.size, self.filename)
    }

    /// Decode a header line. The leading `C` and the trailing newline are
    /// both optional so callers may pass the line with or without its record
    /// marker.
    pub fn decode(line: &str) -> Result<Self> {
        let body = line.strip_suffix('\n').unwrap_or(line);
        let body = body.strip_prefix('C').unwrap_or(body);
        let malformed = || ScpError::MalformedHeader(line.to_string());

        let mut fields = body.splitn(3, ' ');
        let (mode, size, filename) = match (fields.next(), fields.next(), fields.next()) {
            (Some(m), Some(s), Some(f)) => (m, s, f),
            _ => return Err(malformed()),
        };

        let mode = u32::from_str_radix(mode, 8).map_err(|_| malformed())?;
        let size: u64 = size.parse().map_err(|_| malformed())?;
        if filename.is_empty() || filename == "." || filename == ".." || filename.contains('/') {
            return Err(malformed());
        }

        Ok(Self {
            mode,
            size,
            filename: filename.to_string(),
        })
    }
}

/// Write the one-byte "ready" signal
pub async fn ack<W: AsyncWrite + Unpin + ?Sized>(w: &mut W) -> std::io::Result<()> {
    w.write_all(&[status::OK]).await?;
    w.flush().await
}

/// Read one status reply (header exchange phase)
pub async fn parse_response<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<ControlResponse> {
    read_response(r, Phase::HeaderExchange).await
}

pub(crate) async fn read_response<R: AsyncRead + Unpin + ?Sized>(
    r: &mut R,
    phase: Phase,
) -> Result<ControlResponse> {
    let byte = read_byte(r, phase)
        .await?
        .ok_or_else(|| ScpError::ProtocolViolation("stream closed before status byte".into()))?;
    match byte {
        status::OK => Ok(ControlResponse::Ok),
        status::WARNING => Ok(ControlResponse::Warning(read_line(r, phase, false).await?)),
        status::FATAL => Ok(ControlResponse::Fatal(read_line(r, phase, false).await?)),
        other => Err(ScpError::ProtocolViolation(format!(
            "unexpected status byte 0x{:02x}",
            other
        ))),
    }
}

/// Read the source side's answer to our first ack: either a failure reply or
/// a file record. Timestamp records are acknowledged and skipped.
pub(crate) async fn read_file_header<R, W>(r: &mut R, w: &mut W) -> Result<FileHeader>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let phase = Phase::HeaderExchange;
    loop {
        let byte = read_byte(r, phase).await?.ok_or_else(|| {
            ScpError::ProtocolViolation("stream closed before file header".into())
        })?;
        match byte {
            status::WARNING => return Err(ScpError::RemoteWarning(read_line(r, phase, false).await?)),
            status::FATAL => return Err(ScpError::RemoteFatal(read_line(r, phase, false).await?)),
            record::FILE => {
                let line = read_line(r, phase, true).await?;
                return FileHeader::decode(&line);
            }
            record::DIR => {
                let line = read_line(r, phase, true).await?;
                return Err(ScpError::DirectoryUnsupported(line));
            }
            record::END_DIR => {
                return Err(ScpError::ProtocolViolation(
                    "end-of-directory record without a directory".into(),
                ))
            }
            record::TIMES => {
                read_line(r, phase, true).await?;
                ack(w).await.phase(phase)?;
            }
            other => {
                return Err(ScpError::ProtocolViolation(format!(
                    "expected file record, got byte 0x{:02x}",
                    other
                )))
            }
        }
    }
}

async fn read_byte<R: AsyncRead + Unpin + ?Sized>(r: &mut R, phase: Phase) -> Result<Option<u8>> {
    let mut b = [0u8; 1];
    let n = r.read(&mut b).await.phase(phase)?;
    Ok(if n == 0 { None } else { Some(b[0]) })
}

// Reads up to and excluding '\n'. Failure messages tolerate a missing
// newline at end of stream; record lines do not.
async fn read_line<R: AsyncRead + Unpin + ?Sized>(
    r: &mut R,
    phase: Phase,
    require_newline: bool,
) -> Result<String> {
    let mut buf = Vec::new();
    loop {
        match read_byte(r, phase).await? {
            Some(b'\n') => break,
            Some(b) => {
                if buf.len() >= MAX_LINE_LEN {
                    return Err(ScpError::ProtocolViolation("control line too long".into()));
                }
                buf.push(b);
            }
            None if require_newline => {
                return Err(ScpError::ProtocolViolation(
                    "stream closed inside control line".into(),
                ))
            }
            None => break,
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
