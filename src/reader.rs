// src/reader.rs - Register reader: owns the controller session
use crate::{
    error::{ConnectionError, ReadError},
    tags::TagDefinition,
    transport::ControllerTransport,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Outcome of the once-per-cycle session check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session was already up
    Connected,
    /// Session was down and the single reconnect attempt succeeded
    Reconnected,
    /// Session is down; reads this cycle fail with `ConnectionLost`
    Down(ConnectionError),
}

/// Serialized, time-bounded access to one controller session.
///
/// Only one request is ever in flight: the transport sits behind an async
/// mutex. A lost session is not retried inside a read; it is retried once at
/// the start of the next cycle through [`RegisterReader::begin_cycle`].
pub struct RegisterReader {
    transport: Mutex<Box<dyn ControllerTransport>>,
    read_timeout: Duration,
    reconnect_attempts: AtomicU64,
}

impl RegisterReader {
    pub fn new(transport: Box<dyn ControllerTransport>, read_timeout: Duration) -> Self {
        Self {
            transport: Mutex::new(transport),
            read_timeout,
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Open the session at process start.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut transport = self.transport.lock().await;
        let endpoint = transport.endpoint();
        match transport.connect().await {
            Ok(()) => {
                info!(endpoint = %endpoint, "Controller session established");
                Ok(())
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Controller connect failed");
                Err(e)
            }
        }
    }

    /// Make at most one reconnect attempt if the session is down.
    pub async fn begin_cycle(&self) -> SessionStatus {
        let mut transport = self.transport.lock().await;
        if transport.is_connected() {
            return SessionStatus::Connected;
        }

        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let endpoint = transport.endpoint();
        match transport.connect().await {
            Ok(()) => {
                info!(endpoint = %endpoint, attempt, "Controller session re-established");
                SessionStatus::Reconnected
            }
            Err(e) => {
                warn!(endpoint = %endpoint, attempt, error = %e, "Reconnect failed, cycle degraded");
                SessionStatus::Down(e)
            }
        }
    }

    /// Fetch exactly the bytes `tag` needs: 4 for REAL, the containing byte
    /// for BOOL.
    pub async fn read_tag(&self, tag: &TagDefinition) -> Result<Vec<u8>, ReadError> {
        self.read_block(tag.address.db, tag.address.start, tag.value_type.byte_len())
            .await
    }

    pub async fn read_block(&self, db: u16, start: u32, len: usize) -> Result<Vec<u8>, ReadError> {
        let mut transport = self.transport.lock().await;
        if !transport.is_connected() {
            return Err(ReadError::ConnectionLost("session down".into()));
        }

        let bytes = timeout(self.read_timeout, transport.read_block(db, start, len))
            .await
            .map_err(|_| ReadError::Timeout(self.read_timeout.as_millis() as u64))??;
        debug!(db, start, len, "Read block");
        Ok(bytes)
    }

    pub async fn write_block(&self, db: u16, start: u32, data: &[u8]) -> Result<(), ReadError> {
        let mut transport = self.transport.lock().await;
        if !transport.is_connected() {
            return Err(ReadError::ConnectionLost("session down".into()));
        }

        timeout(self.read_timeout, transport.write_block(db, start, data))
            .await
            .map_err(|_| ReadError::Timeout(self.read_timeout.as_millis() as u64))??;
        debug!(db, start, len = data.len(), "Wrote block");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Release the session. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut transport = self.transport.lock().await;
        if transport.is_connected() {
            transport.disconnect().await;
            info!(endpoint = %transport.endpoint(), "Controller session released");
        }
    }
}
