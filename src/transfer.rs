//! Single-file scp transfers over a [`Session`]
//!
//! Download runs one task: ack, read header, ack, copy payload, read the
//! source's status, ack, wait for exit.
//!
//! Upload runs two tasks over the same command: one only waits for the remote
//! `scp -t` to exit, the other writes header, payload and terminator and
//! checks the replies. Both are joined and the first error recorded wins.
//!
//! Cancellation is checked at the top level only. A cancelled call returns
//! [`ScpError::Cancelled`] at once while the spawned tasks keep running until
//! the session ends on its own, so a destination file may still be written
//! after the call has returned.

use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Phase, PhaseExt, Result, ScpError};
use crate::logger::{Logger, NoopLogger};
use crate::progress::{NoProgress, ProgressObserver, ProgressWriter};
use crate::protocol::{command, COPY_BUF_SIZE, TERMINATOR};
use crate::protocol_core::{ack, read_file_header, read_response, FileHeader};
use crate::request::{base, clean, Direction, TransferRequest};
use crate::session::{BoxedReader, BoxedWriter, RemoteCommand, Session};

/// Builds a progress observer for `(total_bytes, label)`
pub type ProgressFactory = Arc<dyn Fn(u64, &str) -> Arc<dyn ProgressObserver> + Send + Sync>;

/// Single-slot error cell; only the first error is kept
#[derive(Default)]
struct FirstError(Mutex<Option<ScpError>>);

impl FirstError {
    fn set(&self, err: ScpError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take(&self) -> Option<ScpError> {
        self.0.lock().take()
    }
}

pub struct Transfer {
    logger: Arc<dyn Logger>,
    progress: ProgressFactory,
    cancel: CancellationToken,
}

impl Transfer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            logger: Arc::new(NoopLogger),
            progress: Arc::new(|_: u64, _: &str| Arc::new(NoProgress) as Arc<dyn ProgressObserver>),
            cancel,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFactory) -> Self {
        self.progress = progress;
        self
    }

    /// Run a validated request; returns the payload size
    pub async fn run<S: Session + ?Sized>(&self, session: &mut S, req: &TransferRequest) -> Result<u64> {
        self.logger.start(req);
        let started = Instant::now();
        let res = match req.direction() {
            Direction::Download => {
                self.download(session, req.remote_path(), Path::new(req.local_path()))
                    .await
            }
            Direction::Upload => {
                self.upload(session, Path::new(req.local_path()), req.remote_path())
                    .await
            }
        };
        match res {
            Ok(bytes) => self
                .logger
                .done(req, bytes, started.elapsed().as_secs_f64()),
            Err(ref e) => self.logger.error(req, &e.to_string()),
        }
        res
    }

    /// Copy `remote_path` from the peer into `local_path`. An existing
    /// directory at `local_path` receives the file under the header's name.
    pub async fn download<S: Session + ?Sized>(
        &self,
        session: &mut S,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<u64> {
        let cmd = session
            .exec(&command::source(remote_path))
            .phase(Phase::CommandStart)?;
        let local = local_path.to_path_buf();
        let progress = self.progress.clone();
        let logger = self.logger.clone();

        let task = tokio::spawn(async move { receive_file(cmd, local, progress, logger).await });

        self.race(async move {
            match task.await {
                Ok(res) => res,
                Err(e) => Err(ScpError::TaskFailed(e.to_string())),
            }
        })
        .await
    }

    /// Copy the regular file at `local_path` to `remote_path` on the peer
    pub async fn upload<S: Session + ?Sized>(
        &self,
        session: &mut S,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<u64> {
        let meta = tokio::fs::metadata(local_path).await.phase(Phase::LocalFile)?;
        if meta.is_dir() {
            return Err(ScpError::DirectoryUnsupported(local_path.display().to_string()));
        }
        if !meta.is_file() {
            return Err(ScpError::NotRegularFile(local_path.display().to_string()));
        }
        let file = tokio::fs::File::open(local_path).await.phase(Phase::LocalFile)?;
        let header = FileHeader::new(local_mode(&meta), meta.len(), base(&clean(remote_path)));
        self.logger.header(&header.filename, header.mode, header.size);

        let RemoteCommand {
            stdin,
            stdout,
            exit,
        } = session
            .exec(&command::sink(remote_path))
            .phase(Phase::CommandStart)?;

        let slot = Arc::new(FirstError::default());
        let label = format!(
            "uploading : {}",
            local_path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let observer = (self.progress.as_ref())(header.size, &label);

        let command_task = tokio::spawn({
            let slot = slot.clone();
            async move {
                if let Err(e) = exit.await {
                    slot.set(completion_error(e));
                }
            }
        });

        let data_task = tokio::spawn({
            let slot = slot.clone();
            async move {
                let mut stdin = stdin;
                let mut stdout = stdout;
                let res = send_file(&mut stdin, &mut stdout, file, &header, observer.clone()).await;
                match res {
                    Ok(()) => observer.finish(),
                    Err(e) => {
                        observer.abandon();
                        slot.set(e);
                    }
                }
                // Always close input so the remote scp sees EOF and exits
                let _ = stdin.shutdown().await;
                header.size
            }
        });

        self.race(async move {
            let (cmd_res, data_res) = tokio::join!(command_task, data_task);
            if let Err(e) = cmd_res {
                slot.set(ScpError::TaskFailed(e.to_string()));
            }
            let size = match data_res {
                Ok(size) => size,
                Err(e) => {
                    slot.set(ScpError::TaskFailed(e.to_string()));
                    0
                }
            };
            match slot.take() {
                Some(err) => Err(err),
                None => Ok(size),
            }
        })
        .await
    }

    async fn race<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ScpError::Cancelled),
            res = fut => res,
        }
    }
}

async fn receive_file(
    cmd: RemoteCommand,
    local: PathBuf,
    progress: ProgressFactory,
    logger: Arc<dyn Logger>,
) -> Result<u64> {
    let RemoteCommand {
        mut stdin,
        mut stdout,
        exit,
    } = cmd;

    let res = receive_payload(&mut stdin, &mut stdout, &local, &progress, logger.as_ref()).await;
    let _ = stdin.shutdown().await;
    let size = res?;

    exit.await.map_err(completion_error)?;
    Ok(size)
}

async fn receive_payload(
    stdin: &mut BoxedWriter,
    stdout: &mut BoxedReader,
    local: &Path,
    progress: &ProgressFactory,
    logger: &dyn Logger,
) -> Result<u64> {
    ack(stdin).await.phase(Phase::HeaderExchange)?;
    let header = read_file_header(stdout, stdin).await?;
    logger.header(&header.filename, header.mode, header.size);
    ack(stdin).await.phase(Phase::HeaderExchange)?;

    let dest = if local.is_dir() {
        local.join(&header.filename)
    } else {
        local.to_path_buf()
    };
    let file = open_destination(&dest, header.mode)
        .await
        .phase(Phase::LocalFile)?;

    let observer = (progress.as_ref())(header.size, &format!("downloading : {}", header.filename));
    let mut sink = ProgressWriter::new(file, observer.clone());
    let copied = async {
        copy_exact(stdout, &mut sink, header.size).await?;
        sink.flush().await.phase(Phase::PayloadCopy)
    }
    .await;
    if let Err(e) = copied {
        observer.abandon();
        return Err(e);
    }
    observer.finish();

    // The source follows the payload with its own status byte
    read_response(stdout, Phase::Terminator).await?.into_result()?;
    ack(stdin).await.phase(Phase::Terminator)?;
    Ok(header.size)
}

async fn send_file(
    stdin: &mut BoxedWriter,
    stdout: &mut BoxedReader,
    mut file: tokio::fs::File,
    header: &FileHeader,
    observer: Arc<dyn ProgressObserver>,
) -> Result<()> {
    stdin
        .write_all(header.encode().as_bytes())
        .await
        .phase(Phase::HeaderExchange)?;
    stdin.flush().await.phase(Phase::HeaderExchange)?;
    read_response(stdout, Phase::HeaderExchange)
        .await?
        .into_result()?;

    {
        let mut sink = ProgressWriter::new(&mut *stdin, observer);
        copy_exact(&mut file, &mut sink, header.size).await?;
    }

    stdin
        .write_all(&[TERMINATOR])
        .await
        .phase(Phase::Terminator)?;
    stdin.flush().await.phase(Phase::Terminator)?;
    read_response(stdout, Phase::Terminator)
        .await?
        .into_result()
}

/// Copy exactly `size` bytes; a short source is [`ScpError::TruncatedTransfer`]
pub async fn copy_exact<R, W>(reader: &mut R, writer: &mut W, size: u64) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; copy_buf_len(size)];
    let mut received = 0u64;
    while received < size {
        let want = (size - received).min(buf.len() as u64) as usize;
        let n = reader
            .read(&mut buf[..want])
            .await
            .phase(Phase::PayloadCopy)?;
        if n == 0 {
            return Err(ScpError::TruncatedTransfer {
                expected: size,
                received,
            });
        }
        writer
            .write_all(&buf[..n])
            .await
            .phase(Phase::PayloadCopy)?;
        received += n as u64;
    }
    Ok(received)
}

// Never zero, even when `size` does not fit in usize
fn copy_buf_len(size: u64) -> usize {
    usize::try_from(size)
        .unwrap_or(usize::MAX)
        .min(COPY_BUF_SIZE)
        .max(1)
}

async fn open_destination(path: &Path, mode: u32) -> io::Result<tokio::fs::File> {
    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode & 0o777);
    #[cfg(not(unix))]
    let _ = mode;
    opts.open(path).await
}

fn local_mode(meta: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        crate::protocol::DEFAULT_MODE
    }
}

// Non-zero exit status arrives as ErrorKind::Other; anything else is a
// failure to observe the exit at all.
fn completion_error(e: io::Error) -> ScpError {
    if e.kind() == io::ErrorKind::Other {
        ScpError::RemoteCommandFailed(e.to_string())
    } else {
        ScpError::Io {
            phase: Phase::CommandCompletion,
            source: e,
        }
    }
}
