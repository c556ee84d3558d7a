//! sshw library
//!
//! Host tree configuration, interactive host picker, login, and a legacy scp
//! single-file copy engine that runs over any [`session::Session`].

pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod logger;
pub mod login;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod request;
pub mod session;
pub mod transfer;
pub mod tui;
