//! TCP listener for the SMTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::session::{SessionSettings, SmtpSession};
use crate::config::SmtpConfig;
use crate::mail::MailIngestionPipeline;
use crate::{EphemailError, Result};

/// SMTP server that accepts TCP connections.
pub struct SmtpServer {
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl SmtpServer {
    /// Create a new SmtpServer bound to the configured address.
    pub async fn bind(config: &SmtpConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("SMTP server listening on {}", local_addr);

        Ok(Self {
            listener,
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the maximum number of connections allowed.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the number of available connection slots.
    pub fn available_connections(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the number of active connections.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }

    /// Wait for a free session slot, then accept the next connection.
    ///
    /// Clients beyond the ceiling wait in the listen backlog. The slot is
    /// released when the returned permit is dropped.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        if self.semaphore.available_permits() == 0 {
            debug!("Session limit of {} reached, deferring accept", self.max_connections);
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EphemailError::Internal("session semaphore closed".to_string()))?;

        let (stream, addr) = self.listener.accept().await?;
        debug!("Accepted connection from {}", addr);
        Ok((stream, addr, permit))
    }

    /// Serve SMTP until the surrounding task is cancelled.
    ///
    /// Each connection runs its own [`SmtpSession`] on a spawned task that
    /// holds a session slot for its lifetime.
    pub async fn serve(self, pipeline: MailIngestionPipeline, settings: SessionSettings) -> Result<()> {
        loop {
            let (stream, addr, permit) = match self.accept().await {
                Ok(accepted) => accepted,
                Err(e @ EphemailError::Internal(_)) => return Err(e),
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let session =
                SmtpSession::new(stream, pipeline.clone(), settings.clone()).with_peer(addr);
            tokio::spawn(async move {
                if let Err(e) = session.run().await {
                    warn!("SMTP session with {} ended with error: {}", addr, e);
                }
                drop(permit);
            });
        }
    }
}
