//! Shared protocol constants for the legacy scp wire format

// Control bytes (first byte of every status reply)
pub mod status {
    pub const OK: u8 = 0x00;
    pub const WARNING: u8 = 0x01;
    pub const FATAL: u8 = 0x02;
}

// Record type markers sent by the source side
pub mod record {
    pub const FILE: u8 = b'C';
    pub const DIR: u8 = b'D';
    pub const END_DIR: u8 = b'E';
    pub const TIMES: u8 = b'T';
}

// Sent after exactly `size` payload bytes; same value as an ack
pub const TERMINATOR: u8 = 0x00;

// Mode used when local permission bits are unavailable
pub const DEFAULT_MODE: u32 = 0o644;

// Upper bound for a single control line (message or header)
pub const MAX_LINE_LEN: usize = 64 * 1024;

// Copy buffer for payload streaming
pub const COPY_BUF_SIZE: usize = 64 * 1024;

// Remote command templates
pub mod command {
    /// Remote side acts as source (`-f` = from)
    pub fn source(path: &str) -> String {
        format!("scp -f {}", shell_quote(path))
    }

    /// Remote side acts as sink (`-t` = to)
    pub fn sink(path: &str) -> String {
        format!("scp -t {}", shell_quote(path))
    }

    /// Single-quote for a POSIX remote shell
    pub fn shell_quote(s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for c in s.chars() {
            if c == '\'' {
                out.push_str("'\\''");
            } else {
                out.push(c);
            }
        }
        out.push('\'');
        out
    }
}
