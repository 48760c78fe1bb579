// src/engine.rs - Poll cycle scheduler
use crate::{
    alarm::evaluate,
    config::EngineConfig,
    decode::decode,
    error::{DecodeError, PlcError, ReadError, Result, StoreError},
    latest::LatestValues,
    reader::{RegisterReader, SessionStatus},
    reading::{MonotonicClock, Reading},
    store::LogStore,
    tags::{TagDefinition, TagRegistry},
    value::DecodedValue,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// STATES AND REPORTS
// ============================================================================

/// Process-wide scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Where a tag ended up within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TagState {
    Idle,
    Reading,
    Committed,
    CycleFailed,
}

/// Terminal result for one tag in one cycle.
#[derive(Debug)]
pub enum TagOutcome {
    Committed {
        id: i64,
        value: DecodedValue,
        alarm: bool,
    },
    ReadFailed(ReadError),
    DecodeFailed(DecodeError),
    StoreFailed(StoreError),
}

impl TagOutcome {
    pub fn state(&self) -> TagState {
        match self {
            TagOutcome::Committed { .. } => TagState::Committed,
            _ => TagState::CycleFailed,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TagOutcome::Committed { .. })
    }

    /// Failure label for logs, `None` when committed.
    pub fn error_kind(&self) -> Option<&'static str> {
        match self {
            TagOutcome::Committed { .. } => None,
            TagOutcome::ReadFailed(e) => Some(e.kind()),
            TagOutcome::DecodeFailed(_) => Some("decode"),
            TagOutcome::StoreFailed(_) => Some("store"),
        }
    }
}

/// Everything that happened in one poll cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub session: SessionStatus,
    pub outcomes: Vec<(String, TagOutcome)>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn outcome(&self, tag: &str) -> Option<&TagOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, outcome)| outcome)
    }

    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.committed()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EngineStats {
    pub state: SchedulerState,
    pub cycles: u64,
    pub rows_appended: u64,
    pub read_failures: u64,
    pub decode_failures: u64,
    pub store_failures: u64,
    pub store_failure_streak: u32,
    pub store_alert_active: bool,
    pub reconnect_attempts: u64,
    pub uptime_secs: u64,
    pub last_cycle_ms: u64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Drives Read -> Decode -> Evaluate -> Append for every tag at a fixed
/// cadence.
///
/// Cycles never overlap: a cycle that overruns the interval delays the next
/// tick. Per-tag failures are logged and skipped; nothing inside a cycle can
/// end the loop. Only the cancellation token stops it, after the in-flight
/// cycle has finished, and the controller session is released on the way
/// out.
pub struct Engine {
    registry: Arc<TagRegistry>,
    reader: Arc<RegisterReader>,
    store: LogStore,
    latest: LatestValues,
    clock: MonotonicClock,
    config: EngineConfig,
    cancel: CancellationToken,
    running: AtomicBool,
    cycle_count: AtomicU64,
    rows_appended: AtomicU64,
    read_failures: AtomicU64,
    decode_failures: AtomicU64,
    store_failures: AtomicU64,
    store_failure_streak: AtomicU32,
    store_alert_active: AtomicBool,
    last_cycle_ms: AtomicU64,
    start_time: Instant,
}

impl Engine {
    pub fn new(
        registry: TagRegistry,
        reader: Arc<RegisterReader>,
        store: LogStore,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            reader,
            store,
            latest: LatestValues::new(),
            clock: MonotonicClock::new(),
            config,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            cycle_count: AtomicU64::new(0),
            rows_appended: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            store_failure_streak: AtomicU32::new(0),
            store_alert_active: AtomicBool::new(false),
            last_cycle_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Token that stops [`Engine::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        info!("Stopping poll engine");
        self.cancel.cancel();
    }

    /// Tick until the shutdown token is cancelled, then release the session.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PlcError::AlreadyRunning);
        }

        info!(
            tags = self.registry.len(),
            interval_ms = self.config.poll_interval_ms,
            "Starting poll engine"
        );

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        self.reader.shutdown().await;
        self.running.store(false, Ordering::SeqCst);
        info!("Poll engine stopped");
        Ok(())
    }

    /// One full pass over all tags.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_start = Instant::now();
        let cycle = self.cycle_count.fetch_add(1, Ordering::Relaxed) + 1;
        let session = self.reader.begin_cycle().await;
        let timestamp = self.clock.now();

        let mut outcomes = Vec::with_capacity(self.registry.len());
        if let SessionStatus::Down(e) = &session {
            warn!(cycle, error = %e, "Controller unreachable, no readings this cycle");
            for tag in self.registry.iter() {
                self.read_failures.fetch_add(1, Ordering::Relaxed);
                outcomes.push((
                    tag.name.clone(),
                    TagOutcome::ReadFailed(ReadError::ConnectionLost(e.to_string())),
                ));
            }
        } else {
            for tag in self.registry.iter() {
                let outcome = self.process_tag(tag, timestamp).await;
                outcomes.push((tag.name.clone(), outcome));
            }
        }

        let duration = cycle_start.elapsed();
        self.last_cycle_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);

        let report = CycleReport {
            cycle,
            timestamp,
            session,
            outcomes,
            duration,
        };
        debug!(
            cycle,
            committed = report.committed(),
            failed = report.failed(),
            elapsed_ms = duration.as_millis() as u64,
            "Poll cycle complete"
        );
        if duration > self.config.poll_interval() {
            warn!(cycle, elapsed_ms = duration.as_millis() as u64, "Poll cycle overran its interval");
        }
        report
    }

    async fn process_tag(&self, tag: &TagDefinition, timestamp: DateTime<Utc>) -> TagOutcome {
        let bytes = match self.reader.read_tag(tag).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.read_failures.fetch_add(1, Ordering::Relaxed);
                warn!(tag = %tag.name, kind = e.kind(), error = %e, "Read failed, tag skipped");
                return TagOutcome::ReadFailed(e);
            }
        };

        let value = match decode(tag.value_type, &bytes, tag.address.bit) {
            Ok(value) => value,
            Err(e) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    tag = %tag.name,
                    kind = "decode",
                    address = %tag.address,
                    error = %e,
                    "Decode failed, check tag type against controller layout"
                );
                return TagOutcome::DecodeFailed(e);
            }
        };

        let alarm = evaluate(tag.alarm_rule.as_ref(), &value);
        let reading = Reading::new(timestamp, tag.name.clone(), value.as_f64(), alarm);

        let store = self.store.clone();
        let appended = tokio::task::spawn_blocking(move || store.append(&reading))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))
            .and_then(|r| r);

        match appended {
            Ok(id) => {
                self.rows_appended.fetch_add(1, Ordering::Relaxed);
                self.store_failure_streak.store(0, Ordering::Relaxed);
                if self.store_alert_active.swap(false, Ordering::Relaxed) {
                    info!("Reading log writable again, store alert cleared");
                }
                self.latest.record(&tag.name, value, timestamp);
                if alarm {
                    info!(tag = %tag.name, value = %value, "Tag in alarm");
                }
                TagOutcome::Committed { id, value, alarm }
            }
            Err(e) => {
                self.store_failures.fetch_add(1, Ordering::Relaxed);
                let streak = self.store_failure_streak.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(tag = %tag.name, kind = "store", error = %e, "Append failed, reading dropped");
                if streak >= self.config.store_alert_threshold
                    && !self.store_alert_active.swap(true, Ordering::Relaxed)
                {
                    error!(
                        streak,
                        alert = true,
                        "Reading log keeps rejecting appends, operator attention required"
                    );
                }
                TagOutcome::StoreFailed(e)
            }
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn latest(&self) -> &LatestValues {
        &self.latest
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            state: self.state(),
            cycles: self.cycle_count.load(Ordering::Relaxed),
            rows_appended: self.rows_appended.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            store_failure_streak: self.store_failure_streak.load(Ordering::Relaxed),
            store_alert_active: self.store_alert_active.load(Ordering::Relaxed),
            reconnect_attempts: self.reader.reconnect_attempts(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            last_cycle_ms: self.last_cycle_ms.load(Ordering::Relaxed),
        }
    }
}
