// src/transport/s7.rs
use super::ControllerTransport;
use crate::{
    config::ControllerConfig,
    error::{ConnectionError, ReadError},
};
use async_trait::async_trait;
use s7::{client::Client, error::Error as S7Error, tcp, transport};
use std::io::ErrorKind;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task;
use tracing::{error, info, warn};

type Session = Arc<Mutex<Option<Client<tcp::Transport>>>>;

/// Siemens S7 session over ISO-on-TCP (port 102).
///
/// The `s7` client is blocking, so every call runs on the blocking pool and
/// the caller's timeout can still fire while the socket waits. Socket
/// timeouts are set from the configured connect timeout; they bound how long
/// an abandoned call keeps the session locked.
pub struct S7Transport {
    config: ControllerConfig,
    session: Session,
    connected: Arc<AtomicBool>,
}

impl S7Transport {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run one client call on the blocking pool. Any failure other than a
    /// protocol fault closes the session.
    async fn call<T, F>(&self, context: &'static str, op: F) -> Result<T, ReadError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client<tcp::Transport>) -> Result<T, S7Error> + Send + 'static,
    {
        let session = self.session.clone();
        let connected = self.connected.clone();
        let socket_timeout_ms = self.config.connect_timeout_ms;

        let joined = task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| ReadError::ConnectionLost(format!("{}: session lock poisoned", context)))?;
            let client = guard
                .as_mut()
                .ok_or_else(|| ReadError::ConnectionLost("not connected".into()))?;

            let result = op(client);
            match result {
                Ok(value) => Ok(value),
                Err(e) => {
                    let fault = read_failure(context, &e, socket_timeout_ms);
                    if !matches!(fault, ReadError::ProtocolFault(_)) {
                        *guard = None;
                        connected.store(false, Ordering::SeqCst);
                        warn!("S7 session closed after {}: {:?}", context, e);
                    }
                    Err(fault)
                }
            }
        })
        .await;

        joined.map_err(|e| ReadError::ConnectionLost(format!("{}: worker failed: {}", context, e)))?
    }
}

/// Map a client error from a read or write.
///
/// Socket and session failures mean the session is gone. A socket timeout
/// leaves an unanswered request on the wire, so it ends the session too.
/// Errors the CPU answered with leave it usable.
fn read_failure(context: &str, err: &S7Error, socket_timeout_ms: u64) -> ReadError {
    match err {
        S7Error::IOError(ErrorKind::TimedOut) | S7Error::IOError(ErrorKind::WouldBlock) => {
            ReadError::Timeout(socket_timeout_ms)
        }
        S7Error::IOError(_) | S7Error::Send | S7Error::Connect(_) | S7Error::Iso | S7Error::Lock => {
            ReadError::ConnectionLost(format!("{}: {:?}", context, err))
        }
        _ => ReadError::ProtocolFault(format!("{}: {:?}", context, err)),
    }
}

fn connect_failure(address: String, err: &S7Error) -> ConnectionError {
    let timed_out = match err {
        S7Error::IOError(kind) => matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock),
        S7Error::Connect(reason) => reason.to_lowercase().contains("timed out"),
        _ => false,
    };
    if timed_out {
        ConnectionError::Timeout { address }
    } else {
        ConnectionError::Unreachable {
            address,
            reason: format!("{:?}", err),
        }
    }
}

#[async_trait]
impl ControllerTransport for S7Transport {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let addr: IpAddr = self
            .config
            .ip
            .parse()
            .map_err(|_| ConnectionError::InvalidAddress(self.config.ip.clone()))?;

        let mut opts = tcp::Options::new(addr, self.config.rack, self.config.slot, transport::Connection::PG);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        opts.read_timeout = timeout;
        opts.write_timeout = timeout;

        let endpoint = self.endpoint();
        let session = self.session.clone();
        let joined = task::spawn_blocking(move || {
            let client = tcp::Transport::connect(opts).and_then(Client::new)?;
            match session.lock() {
                Ok(mut guard) => *guard = Some(client),
                Err(_) => return Err(S7Error::Lock),
            }
            Ok(())
        })
        .await;

        let result = joined.map_err(|e| ConnectionError::Unreachable {
            address: endpoint.clone(),
            reason: format!("connect worker failed: {}", e),
        })?;
        if let Err(e) = result {
            error!("Failed to connect to S7 PLC: {:?}", e);
            return Err(connect_failure(endpoint, &e));
        }

        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to S7 PLC at {}", endpoint);
        Ok(())
    }

    async fn read_block(&mut self, db: u16, start: u32, len: usize) -> Result<Vec<u8>, ReadError> {
        self.call("S7 read", move |client| {
            let mut buffer = vec![0u8; len];
            client.ag_read(db as i32, start as i32, len as i32, &mut buffer)?;
            Ok(buffer)
        })
        .await
    }

    async fn write_block(&mut self, db: u16, start: u32, data: &[u8]) -> Result<(), ReadError> {
        let mut buffer = data.to_vec();
        self.call("S7 write", move |client| {
            let len = buffer.len() as i32;
            client.ag_write(db as i32, start as i32, len, &mut buffer)
        })
        .await
    }

    async fn disconnect(&mut self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let session = self.session.clone();
        let _ = task::spawn_blocking(move || {
            if let Ok(mut guard) = session.lock() {
                guard.take();
            }
        })
        .await;
        info!("Disconnected from S7 PLC at {}", self.endpoint());
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}:{}", self.config.ip, self.config.rack, self.config.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_timeout_is_a_timeout() {
        let fault = read_failure("S7 read", &S7Error::IOError(ErrorKind::TimedOut), 2000);
        assert_eq!(fault, ReadError::Timeout(2000));
        let fault = read_failure("S7 read", &S7Error::IOError(ErrorKind::WouldBlock), 2000);
        assert_eq!(fault, ReadError::Timeout(2000));
    }

    #[test]
    fn test_socket_failures_lose_the_session() {
        for err in [
            S7Error::IOError(ErrorKind::ConnectionReset),
            S7Error::IOError(ErrorKind::BrokenPipe),
            S7Error::Send,
            S7Error::Iso,
            S7Error::Connect("peer closed".into()),
        ] {
            assert!(
                matches!(read_failure("S7 read", &err, 2000), ReadError::ConnectionLost(_)),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_cpu_answers_are_protocol_faults() {
        for err in [S7Error::CPU { code: 0x0A }, S7Error::Response { code: 5 }] {
            assert!(
                matches!(read_failure("S7 read", &err, 2000), ReadError::ProtocolFault(_)),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_connect_timeouts_are_recognized() {
        let addr = || "192.168.0.10:0:1".to_string();
        assert!(matches!(
            connect_failure(addr(), &S7Error::IOError(ErrorKind::TimedOut)),
            ConnectionError::Timeout { .. }
        ));
        assert!(matches!(
            connect_failure(addr(), &S7Error::Connect("connection timed out".into())),
            ConnectionError::Timeout { .. }
        ));
        assert!(matches!(
            connect_failure(addr(), &S7Error::IOError(ErrorKind::ConnectionRefused)),
            ConnectionError::Unreachable { .. }
        ));
    }

    #[tokio::test]
    async fn test_calls_without_session_fail_fast() {
        let mut plc = S7Transport::new(ControllerConfig::default());
        assert!(!plc.is_connected());
        assert_eq!(
            plc.read_block(24, 0, 4).await,
            Err(ReadError::ConnectionLost("not connected".into()))
        );
        assert!(plc.write_block(24, 0, &[0; 4]).await.is_err());
        plc.disconnect().await;
    }

    #[tokio::test]
    async fn test_bad_address_rejected_before_dialing() {
        let mut plc = S7Transport::new(ControllerConfig {
            ip: "not-an-ip".into(),
            ..ControllerConfig::default()
        });
        assert!(matches!(
            plc.connect().await,
            Err(ConnectionError::InvalidAddress(_))
        ));
    }
}
