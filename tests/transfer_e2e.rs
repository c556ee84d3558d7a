use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sshw::error::ScpError;
use sshw::logger::TextLogger;
use sshw::progress::{ByteCounter, ProgressObserver};
use sshw::request::TransferRequest;
use sshw::session::{RemoteCommand, Session};
use sshw::transfer::Transfer;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

/// The remote scp side of an in-memory session
struct Peer {
    /// What we wrote to the remote's stdin
    input: DuplexStream,
    /// Feeds our view of the remote's stdout
    output: DuplexStream,
}

type PeerFn = Box<dyn FnOnce(Peer) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send>> + Send>;

struct MockSession {
    peer: Option<PeerFn>,
    command: Arc<Mutex<Option<String>>>,
}

impl MockSession {
    fn new<F, Fut>(peer: F) -> Self
    where
        F: FnOnce(Peer) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        Self {
            peer: Some(Box::new(move |p| Box::pin(peer(p)))),
            command: Arc::new(Mutex::new(None)),
        }
    }

    fn command(&self) -> Option<String> {
        self.command.lock().unwrap().clone()
    }
}

impl Session for MockSession {
    fn exec(&mut self, command: &str) -> io::Result<RemoteCommand> {
        let peer = self
            .peer
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "already used"))?;
        *self.command.lock().unwrap() = Some(command.to_string());

        let (our_stdin, peer_input) = tokio::io::duplex(64 * 1024);
        let (peer_output, our_stdout) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(peer(Peer {
            input: peer_input,
            output: peer_output,
        }));

        Ok(RemoteCommand {
            stdin: Box::new(our_stdin),
            stdout: Box::new(our_stdout),
            exit: Box::pin(async move {
                handle
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::Interrupted, e.to_string()))?
            }),
        })
    }
}

async fn expect_ack(r: &mut DuplexStream) -> io::Result<()> {
    let b = r.read_u8().await?;
    if b != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("expected ack, got {b}")));
    }
    Ok(())
}

async fn read_line(r: &mut DuplexStream) -> io::Result<String> {
    let mut line = Vec::new();
    loop {
        let b = r.read_u8().await?;
        line.push(b);
        if b == b'\n' {
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

fn exit_failure() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "exit status: 1")
}

fn write_local(dir: &std::path::Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    }
    path
}

#[tokio::test]
async fn download_writes_exact_payload() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("hello.txt");

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"C0644 5 hello.txt\n").await?;
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"world").await?;
        p.output.write_all(&[0]).await?;
        expect_ack(&mut p.input).await?;
        Ok(())
    });

    let counter = Arc::new(ByteCounter::default());
    let factory_counter = counter.clone();
    let transfer = Transfer::new(CancellationToken::new()).with_progress(Arc::new(
        move |_: u64, _: &str| factory_counter.clone() as Arc<dyn ProgressObserver>,
    ));

    let n = transfer
        .download(&mut session, "/remote/hello.txt", &dest)
        .await
        .unwrap();
    assert_eq!(n, 5);
    assert_eq!(std::fs::read(&dest).unwrap(), b"world");
    assert_eq!(counter.total(), 5);
    assert_eq!(session.command().as_deref(), Some("scp -f '/remote/hello.txt'"));
}

#[tokio::test]
async fn download_into_existing_directory_uses_header_name() {
    let dir = tempfile::tempdir().unwrap();

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"C0600 3 notes.md\n").await?;
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"abc\0").await?;
        expect_ack(&mut p.input).await?;
        Ok(())
    });

    let transfer = Transfer::new(CancellationToken::new());
    transfer
        .download(&mut session, "notes.md", dir.path())
        .await
        .unwrap();
    assert_eq!(std::fs::read(dir.path().join("notes.md")).unwrap(), b"abc");
}

#[tokio::test]
async fn download_truncated_payload_fails() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("big.bin");

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"C0644 10 big.bin\n").await?;
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"abcd").await?;
        drop(p.output);
        Ok(())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .download(&mut session, "big.bin", &dest)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ScpError::TruncatedTransfer { expected: 10, received: 4 }),
        "{err:?}"
    );
}

#[tokio::test]
async fn download_surfaces_remote_message() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x");

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output
            .write_all(b"\x01scp: /nope: No such file or directory\n")
            .await?;
        Err(exit_failure())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .download(&mut session, "/nope", &dest)
        .await
        .unwrap_err();
    match err {
        ScpError::RemoteWarning(m) => assert_eq!(m, "scp: /nope: No such file or directory"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn download_reports_failed_exit_after_copy() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("hello.txt");

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"C0644 5 hello.txt\n").await?;
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"world\0").await?;
        expect_ack(&mut p.input).await?;
        Err(exit_failure())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .download(&mut session, "hello.txt", &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, ScpError::RemoteCommandFailed(_)), "{err:?}");
    assert_eq!(std::fs::read(&dest).unwrap(), b"world");
}

#[tokio::test]
async fn upload_produces_exact_wire_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_local(dir.path(), "hello.txt", b"world");
    let wire = Arc::new(Mutex::new(Vec::new()));
    let peer_wire = wire.clone();

    let mut session = MockSession::new(move |mut p: Peer| async move {
        let header = read_line(&mut p.input).await?;
        p.output.write_all(&[0]).await?;
        let mut payload = [0u8; 6];
        p.input.read_exact(&mut payload).await?;
        p.output.write_all(&[0]).await?;
        // input must be closed by the client once it is done
        let mut rest = Vec::new();
        p.input.read_to_end(&mut rest).await?;

        let mut w = peer_wire.lock().unwrap();
        w.extend_from_slice(header.as_bytes());
        w.extend_from_slice(&payload);
        w.extend_from_slice(&rest);
        Ok(())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let n = tokio::time::timeout(
        Duration::from_secs(5),
        transfer.upload(&mut session, &src, "/tmp/hello.txt"),
    )
    .await
    .expect("upload hung")
    .unwrap();

    assert_eq!(n, 5);
    assert_eq!(wire.lock().unwrap().as_slice(), b"C0644 5 hello.txt\nworld\0");
    assert_eq!(session.command().as_deref(), Some("scp -t '/tmp/hello.txt'"));
}

#[tokio::test]
async fn upload_rejected_header_closes_input() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_local(dir.path(), "hello.txt", b"world");

    let mut session = MockSession::new(|mut p: Peer| async move {
        read_line(&mut p.input).await?;
        p.output.write_all(b"\x02scp: /ro/hello.txt: Permission denied\n").await?;
        let mut rest = Vec::new();
        p.input.read_to_end(&mut rest).await?;
        Err(exit_failure())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        transfer.upload(&mut session, &src, "/ro/hello.txt"),
    )
    .await
    .expect("upload hung")
    .unwrap_err();

    match err {
        ScpError::RemoteFatal(m) => assert_eq!(m, "scp: /ro/hello.txt: Permission denied"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn upload_reports_failed_remote_command() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_local(dir.path(), "a.bin", b"0123456789");

    let mut session = MockSession::new(|mut p: Peer| async move {
        read_line(&mut p.input).await?;
        p.output.write_all(&[0]).await?;
        let mut payload = [0u8; 11];
        p.input.read_exact(&mut payload).await?;
        p.output.write_all(&[0]).await?;
        let mut rest = Vec::new();
        p.input.read_to_end(&mut rest).await?;
        Err(exit_failure())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .upload(&mut session, &src, "a.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, ScpError::RemoteCommandFailed(_)), "{err:?}");
}

#[tokio::test]
async fn upload_directory_is_rejected_before_exec() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = MockSession::new(|_p: Peer| async move { Ok(()) });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .upload(&mut session, dir.path(), "/tmp/x")
        .await
        .unwrap_err();
    assert!(matches!(err, ScpError::DirectoryUnsupported(_)), "{err:?}");
    assert!(session.command().is_none());
}

#[tokio::test]
async fn cancellation_returns_while_peer_stalls() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("stalled");

    let mut session = MockSession::new(|p: Peer| async move {
        let _keep = p;
        std::future::pending::<()>().await;
        Ok(())
    });

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let transfer = Transfer::new(token);
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        transfer.download(&mut session, "stalled", &dest),
    )
    .await
    .expect("cancel ignored")
    .unwrap_err();
    assert!(matches!(err, ScpError::Cancelled), "{err:?}");
}

#[tokio::test]
async fn run_logs_request_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("transfer.log");
    let target = format!("{}/", dir.path().display());
    let req = TransferRequest::parse(&format!("scp web:/srv/hello.txt {}", target)).unwrap();

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"C0644 5 hello.txt\n").await?;
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"world\0").await?;
        expect_ack(&mut p.input).await?;
        Ok(())
    });

    let transfer = Transfer::new(CancellationToken::new())
        .with_logger(Arc::new(TextLogger::new(&log_path).unwrap()));
    assert_eq!(transfer.run(&mut session, &req).await.unwrap(), 5);
    assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"world");

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("START dir=Download host=web remote=/srv/hello.txt"));
    assert!(log.contains("HEADER name=hello.txt mode=0644 size=5"));
    assert!(log.contains("DONE host=web remote=/srv/hello.txt bytes=5"));
}

#[tokio::test]
async fn upload_cancellation_returns_while_peer_stalls() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_local(dir.path(), "hello.txt", b"world");

    let mut session = MockSession::new(|p: Peer| async move {
        let _keep = p;
        std::future::pending::<()>().await;
        Ok(())
    });

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let transfer = Transfer::new(token);
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        transfer.upload(&mut session, &src, "/tmp/hello.txt"),
    )
    .await
    .expect("cancel ignored")
    .unwrap_err();
    assert!(matches!(err, ScpError::Cancelled), "{err:?}");
}

#[tokio::test]
async fn upload_reports_warning_after_payload() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_local(dir.path(), "hello.txt", b"world");

    let mut session = MockSession::new(|mut p: Peer| async move {
        read_line(&mut p.input).await?;
        p.output.write_all(&[0]).await?;
        let mut payload = [0u8; 6];
        p.input.read_exact(&mut payload).await?;
        p.output.write_all(b"\x01disk full\n").await?;
        let mut rest = Vec::new();
        p.input.read_to_end(&mut rest).await?;
        Err(exit_failure())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        transfer.upload(&mut session, &src, "/tmp/hello.txt"),
    )
    .await
    .expect("upload hung")
    .unwrap_err();
    match err {
        ScpError::RemoteWarning(m) => assert_eq!(m, "disk full"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn download_rejects_unexpected_first_reply() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x");

    let mut session = MockSession::new(|mut p: Peer| async move {
        expect_ack(&mut p.input).await?;
        p.output.write_all(b"X0644 5 x\n").await?;
        Ok(())
    });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .download(&mut session, "x", &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, ScpError::ProtocolViolation(_)), "{err:?}");
    assert!(!dest.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn upload_device_is_not_a_regular_file() {
    let mut session = MockSession::new(|_p: Peer| async move { Ok(()) });

    let transfer = Transfer::new(CancellationToken::new());
    let err = transfer
        .upload(&mut session, std::path::Path::new("/dev/null"), "/tmp/x")
        .await
        .unwrap_err();
    assert!(matches!(err, ScpError::NotRegularFile(_)), "{err:?}");
    assert!(session.command().is_none());
}
