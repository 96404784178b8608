//! Test helpers for integration tests.
//!
//! Provides TestClient, TestServer, and helper functions for SMTP testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use ephemail::address::{Address, AddressAllocator, Attribution};
use ephemail::config::{Config, SmtpConfig};
use ephemail::mail::MailIngestionPipeline;
use ephemail::smtp::{SessionSettings, SmtpServer};
use ephemail::Database;

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Domain used throughout the tests.
pub const TEST_DOMAIN: &str = "example.com";

/// Open a file-backed database in a fresh temporary directory.
///
/// The directory is removed when the returned guard is dropped.
pub async fn file_db() -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("ephemail.db")).await.unwrap();
    (db, dir)
}

/// Allocate an address with the default one-hour lifetime.
pub async fn allocate(db: &Database) -> Address {
    AddressAllocator::new(db.clone(), TEST_DOMAIN, chrono::Duration::hours(1))
        .allocate(&Attribution::new().with_ip("127.0.0.1"))
        .await
        .unwrap()
}

/// Create a test configuration.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.mail.domain = TEST_DOMAIN.to_string();
    config.smtp = SmtpConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        hostname: "mx.example.com".to_string(),
        max_connections: 10,
        idle_timeout_secs: 5,
        max_message_bytes: 64 * 1024,
        ..SmtpConfig::default()
    };
    config
}

/// SMTP server running on a loopback port with a temporary database.
pub struct TestServer {
    addr: SocketAddr,
    db: Database,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    _dir: TempDir,
}

impl TestServer {
    /// Start a server with the default test configuration.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Start a server with a custom configuration.
    pub async fn with_config(config: Config) -> Self {
        let (db, dir) = file_db().await;

        let server = SmtpServer::bind(&config.smtp).await.unwrap();
        let addr = server.local_addr().unwrap();

        let pipeline = MailIngestionPipeline::new(db.clone())
            .with_max_message_bytes(config.smtp.max_message_bytes);
        let settings = SessionSettings::from_config(&config);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx => {}
                _ = server.serve(pipeline, settings) => {}
            }
        });

        Self {
            addr,
            db,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            _dir: dir,
        }
    }

    /// Get the local address of the server.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get a reference to the database (for test setup).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Stop accepting connections and wait for the accept loop to end.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = timeout(DEFAULT_TIMEOUT, handle).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Line-oriented SMTP test client.
pub struct TestClient {
    stream: BufReader<TcpStream>,
}

impl TestClient {
    /// Connect to the server at the given address.
    pub async fn connect(addr: SocketAddr) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Send a line, appending CRLF.
    pub async fn send_line(&mut self, line: &str) -> Result<(), std::io::Error> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await
    }

    /// Receive one complete reply, following continuation lines.
    pub async fn recv(&mut self) -> Result<String, std::io::Error> {
        let mut out = String::new();
        loop {
            let mut line = String::new();
            let n = timeout(DEFAULT_TIMEOUT, self.stream.read_line(&mut line))
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply"))??;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            out.push_str(&line);
            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                return Ok(out);
            }
        }
    }

    /// Send a command and assert the reply starts with `code`.
    pub async fn expect(&mut self, line: &str, code: &str) -> String {
        self.send_line(line).await.unwrap();
        let reply = self.recv().await.unwrap();
        assert!(reply.starts_with(code), "{line}: expected {code}, got {reply}");
        reply
    }

    /// Run a complete delivery and return the final DATA reply.
    pub async fn deliver(&mut self, from: &str, to: &str, message: &str) -> String {
        self.expect(&format!("MAIL FROM:<{from}>"), "250").await;
        self.expect(&format!("RCPT TO:<{to}>"), "250").await;
        self.expect("DATA", "354").await;
        for line in message.lines() {
            if line.starts_with('.') {
                self.send_line(&format!(".{line}")).await.unwrap();
            } else {
                self.send_line(line).await.unwrap();
            }
        }
        self.send_line(".").await.unwrap();
        self.recv().await.unwrap()
    }
}
