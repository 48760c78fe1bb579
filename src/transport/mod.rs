// src/transport/mod.rs
//! Controller transports.
//!
//! The engine never sees protocol framing. A transport owns one session to
//! one controller and exposes block reads and writes over it; the
//! [`RegisterReader`](crate::reader::RegisterReader) decides when to connect,
//! reconnect and time out.

use crate::error::{ConnectionError, ReadError};
use async_trait::async_trait;

pub mod simulated;

#[cfg(feature = "s7-support")]
pub mod s7;

pub use simulated::{SimulatedController, SimulatedHandle};

/// Raw access to a controller's data blocks.
///
/// Write failures reuse [`ReadError`]; the failure kinds are the same.
#[async_trait]
pub trait ControllerTransport: Send {
    /// Open the session. Called once at start and again after a lost session.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Read `len` bytes from data block `db` at byte offset `start`.
    async fn read_block(&mut self, db: u16, start: u32, len: usize) -> Result<Vec<u8>, ReadError>;

    /// Write `data` into data block `db` at byte offset `start`.
    async fn write_block(&mut self, db: u16, start: u32, data: &[u8]) -> Result<(), ReadError>;

    /// Close the session. Must be safe to call when not connected.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Human readable endpoint, used in logs.
    fn endpoint(&self) -> String;
}
