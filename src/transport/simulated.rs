// src/transport/simulated.rs
// In-memory controller for bench runs and tests.
//
// Data blocks are plain byte images. A cloneable handle lets the caller change
// register contents and inject transport faults while the reader owns the
// transport itself.

use super::ControllerTransport;
use crate::{
    decode::encode_real,
    error::{ConnectionError, ReadError},
    tags::TagRegistry,
    value::ValueType,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

type Address = (u16, u32);

#[derive(Debug, Default)]
struct SimState {
    blocks: HashMap<u16, Vec<u8>>,
    connected: bool,
    offline: bool,
    failed_connects_left: u32,
    drop_once: HashSet<Address>,
    lost_replies: HashSet<Address>,
    faults: HashSet<Address>,
    short_reads: HashSet<Address>,
    stalls: HashMap<Address, Duration>,
    drift: bool,
    connect_calls: u64,
    read_calls: u64,
    writes: Vec<(u16, u32, Vec<u8>)>,
}

/// Test and bench controller.
///
/// # Examples
///
/// ```rust
/// use tagwatch::transport::{ControllerTransport, SimulatedController};
///
/// # tokio_test::block_on(async {
/// let (mut plc, handle) = SimulatedController::new();
/// handle.set_real(24, 0, 37.5);
/// plc.connect().await.unwrap();
/// let bytes = plc.read_block(24, 0, 4).await.unwrap();
/// assert_eq!(bytes, 37.5f32.to_be_bytes().to_vec());
/// # });
/// ```
#[derive(Debug)]
pub struct SimulatedController {
    state: Arc<Mutex<SimState>>,
}

/// Shared control surface of a [`SimulatedController`].
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedController {
    pub fn new() -> (Self, SimulatedHandle) {
        let state = Arc::new(Mutex::new(SimState::default()));
        (
            Self { state: state.clone() },
            SimulatedHandle { state },
        )
    }

    /// Controller whose blocks cover every tag in `registry`, zero filled.
    ///
    /// With `drift` set, REAL reads wander slowly around their stored value
    /// so a bench run produces a visible trend.
    pub fn for_registry(registry: &TagRegistry, drift: bool) -> (Self, SimulatedHandle) {
        let (plc, handle) = Self::new();
        {
            let mut state = handle.lock();
            state.drift = drift;
            for tag in registry {
                let end = tag.address.start as usize + tag.value_type.byte_len();
                let block = state.blocks.entry(tag.address.db).or_default();
                if block.len() < end {
                    block.resize(end, 0);
                }
            }
        }
        (plc, handle)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ControllerTransport for SimulatedController {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.lock();
        state.connect_calls += 1;
        if state.offline {
            return Err(ConnectionError::Unreachable {
                address: "simulated".into(),
                reason: "controller offline".into(),
            });
        }
        if state.failed_connects_left > 0 {
            state.failed_connects_left -= 1;
            return Err(ConnectionError::Unreachable {
                address: "simulated".into(),
                reason: "connection refused".into(),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn read_block(&mut self, db: u16, start: u32, len: usize) -> Result<Vec<u8>, ReadError> {
        let stall = {
            let mut state = self.lock();
            state.read_calls += 1;
            if !state.connected {
                return Err(ReadError::ConnectionLost("not connected".into()));
            }
            if state.offline || state.drop_once.remove(&(db, start)) {
                state.connected = false;
                return Err(ReadError::ConnectionLost("peer reset the session".into()));
            }
            if state.lost_replies.remove(&(db, start)) {
                return Err(ReadError::ConnectionLost("reply lost in transit".into()));
            }
            if state.faults.contains(&(db, start)) {
                return Err(ReadError::ProtocolFault(format!("DB{} access denied", db)));
            }
            state.stalls.get(&(db, start)).copied()
        };

        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        let read_calls = state.read_calls;
        let drift = state.drift;
        let short = state.short_reads.contains(&(db, start));
        let block = state
            .blocks
            .get(&db)
            .ok_or_else(|| ReadError::ProtocolFault(format!("DB{} does not exist", db)))?;
        let from = start as usize;
        let to = from + len;
        if to > block.len() {
            return Err(ReadError::ProtocolFault(format!(
                "DB{} range {}..{} exceeds block size {}",
                db,
                from,
                to,
                block.len()
            )));
        }

        let mut bytes = block[from..to].to_vec();
        if drift && len == ValueType::Float32.byte_len() {
            let base = f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let wobble = ((read_calls as f32) / 10.0).sin() * 2.0;
            bytes = encode_real(base + wobble).to_vec();
        }
        if short {
            bytes.pop();
        }
        debug!(db, start, len, "Simulated read");
        Ok(bytes)
    }

    async fn write_block(&mut self, db: u16, start: u32, data: &[u8]) -> Result<(), ReadError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(ReadError::ConnectionLost("not connected".into()));
        }
        let from = start as usize;
        let block = state.blocks.entry(db).or_default();
        if block.len() < from + data.len() {
            block.resize(from + data.len(), 0);
        }
        block[from..from + data.len()].copy_from_slice(data);
        state.writes.push((db, start, data.to_vec()));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn endpoint(&self) -> String {
        "simulated".to_string()
    }
}

impl SimulatedHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_bytes(&self, db: u16, start: u32, data: &[u8]) {
        let mut state = self.lock();
        let from = start as usize;
        let block = state.blocks.entry(db).or_default();
        if block.len() < from + data.len() {
            block.resize(from + data.len(), 0);
        }
        block[from..from + data.len()].copy_from_slice(data);
    }

    pub fn set_real(&self, db: u16, start: u32, value: f32) {
        self.set_bytes(db, start, &encode_real(value));
    }

    pub fn set_bit(&self, db: u16, byte: u32, bit: u8, on: bool) {
        let mut state = self.lock();
        let block = state.blocks.entry(db).or_default();
        let idx = byte as usize;
        if block.len() <= idx {
            block.resize(idx + 1, 0);
        }
        if on {
            block[idx] |= 1 << bit;
        } else {
            block[idx] &= !(1 << bit);
        }
    }

    pub fn bytes(&self, db: u16, start: u32, len: usize) -> Option<Vec<u8>> {
        let state = self.lock();
        let block = state.blocks.get(&db)?;
        block.get(start as usize..start as usize + len).map(|s| s.to_vec())
    }

    /// Refuse the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failed_connects_left = n;
    }

    /// Offline controllers refuse connects and lose any open session.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Lose the session on the next read of this address.
    pub fn drop_connection_on(&self, db: u16, start: u32) {
        self.lock().drop_once.insert((db, start));
    }

    /// Fail the next read of this address with `ConnectionLost` while the
    /// session itself survives, as when a single reply is lost.
    pub fn lose_reply_on(&self, db: u16, start: u32) {
        self.lock().lost_replies.insert((db, start));
    }

    /// Reads of this address fail with a protocol fault until cleared.
    pub fn fault_on(&self, db: u16, start: u32) {
        self.lock().faults.insert((db, start));
    }

    /// Reads of this address return one byte too few.
    pub fn short_read_on(&self, db: u16, start: u32) {
        self.lock().short_reads.insert((db, start));
    }

    /// Reads of this address sleep for `delay` before answering.
    pub fn stall_on(&self, db: u16, start: u32, delay: Duration) {
        self.lock().stalls.insert((db, start), delay);
    }

    pub fn clear_faults(&self) {
        let mut state = self.lock();
        state.drop_once.clear();
        state.lost_replies.clear();
        state.faults.clear();
        state.short_reads.clear();
        state.stalls.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connect_calls(&self) -> u64 {
        self.lock().connect_calls
    }

    pub fn read_calls(&self) -> u64 {
        self.lock().read_calls
    }

    /// Every write the controller accepted, in order.
    pub fn writes(&self) -> Vec<(u16, u32, Vec<u8>)> {
        self.lock().writes.clone()
    }
}
