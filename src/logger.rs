use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::request::TransferRequest;

/// Transfer event sink. Every hook defaults to a no-op.
pub trait Logger: Send + Sync {
    fn start(&self, _req: &TransferRequest) {}
    fn header(&self, _filename: &str, _mode: u32, _size: u64) {}
    fn done(&self, _req: &TransferRequest, _bytes: u64, _seconds: f64) {}
    fn error(&self, _req: &TransferRequest, _msg: &str) {}
    fn login(&self, _host: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, req: &TransferRequest) {
        self.line(&format!(
            "START dir={:?} host={} remote={} local={}",
            req.direction(),
            req.remote_host(),
            req.remote_path(),
            req.local_path()
        ));
    }
    fn header(&self, filename: &str, mode: u32, size: u64) {
        self.line(&format!("HEADER name={} mode={:04o} size={}", filename, mode, size));
    }
    fn done(&self, req: &TransferRequest, bytes: u64, seconds: f64) {
        self.line(&format!(
            "DONE host={} remote={} bytes={bytes} seconds={seconds:.3}",
            req.remote_host(),
            req.remote_path()
        ));
    }
    fn error(&self, req: &TransferRequest, msg: &str) {
        self.line(&format!(
            "ERROR host={} remote={} msg={}",
            req.remote_host(),
            req.remote_path(),
            msg
        ));
    }
    fn login(&self, host: &str) {
        self.line(&format!("LOGIN host={}", host));
    }
}
