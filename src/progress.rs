//! Transfer progress display
//!
//! Payload bytes are tee'd through [`ProgressWriter`], which forwards every
//! byte untouched and reports the count to a [`ProgressObserver`].

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::io::AsyncWrite;

pub trait ProgressObserver: Send + Sync {
    fn advance(&self, bytes: u64);
    fn finish(&self) {}
    fn abandon(&self) {}
}

/// Observer that ignores everything
pub struct NoProgress;
impl ProgressObserver for NoProgress {
    fn advance(&self, _bytes: u64) {}
}

/// Counts bytes; used by tests and the transfer summary
#[derive(Default)]
pub struct ByteCounter {
    bytes: AtomicU64,
}

impl ByteCounter {
    pub fn total(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ProgressObserver for ByteCounter {
    fn advance(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Cargo-style byte progress bar on stderr
pub struct BarProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl BarProgress {
    pub fn new(total: u64, label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:25.green}] {bytes}/{total_bytes} {bytes_per_sec} {eta}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        Self {
            bar,
            start_time: Instant::now(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            start_time: Instant::now(),
        }
    }
}

impl ProgressObserver for BarProgress {
    fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finish(&self) {
        let secs = self.start_time.elapsed().as_secs_f64();
        let msg = self.bar.message();
        self.bar
            .finish_with_message(format!("{} done in {:.1}s", msg, secs));
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}

/// `AsyncWrite` tee that reports every accepted byte
pub struct ProgressWriter<W> {
    inner: W,
    observer: Arc<dyn ProgressObserver>,
}

impl<W> ProgressWriter<W> {
    pub fn new(inner: W, observer: Arc<dyn ProgressObserver>) -> Self {
        Self { inner, observer }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.observer.advance(n as u64);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_writer_forwards_and_counts() {
        let counter = Arc::new(ByteCounter::default());
        let mut w = ProgressWriter::new(Vec::new(), counter.clone());
        w.write_all(b"hello ").await.unwrap();
        w.write_all(b"world").await.unwrap();
        w.flush().await.unwrap();
        assert_eq!(counter.total(), 11);
        assert_eq!(w.into_inner(), b"hello world".to_vec());
    }

    #[test]
    fn test_hidden_bar_accepts_updates() {
        let bar = BarProgress::hidden();
        bar.advance(10);
        bar.finish();
    }
}
