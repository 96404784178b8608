//! SMTP module for ephemail.
//!
//! This module provides the inbound mail transport:
//! - Command parsing and reply formatting
//! - Per-connection sessions with size and idle limits
//! - A TCP listener with a connection ceiling
//! - Optional STARTTLS
//!
//! AUTH is not offered.

mod command;
mod listener;
mod reply;
mod session;
mod tls;

pub use command::SmtpCommand;
pub use listener::SmtpServer;
pub use reply::Reply;
pub use session::{SessionSettings, SmtpSession, MAX_COMMAND_LINE};
pub use tls::load_acceptor;
