//! Sensor channel: one worker thread per physiological signal.
//!
//! The worker owns the sample source. It validates each sample, publishes it
//! to the latest-reading slot and appends it to a bounded history. Readers
//! only ever touch the shared state through a [`ChannelFeed`].

use super::slot::LatestSlot;
use super::sources::SampleSource;
use super::types::{SensorReading, SignalKind, ValueRange};
use crate::error::ChannelError;
use crate::transparency::SharedTelemetry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sleep granularity while waiting out a retry delay or a join.
const WAIT_STEP: Duration = Duration::from_millis(10);

/// Configuration for a single channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub kind: SignalKind,
    pub range: ValueRange,
    pub history_capacity: usize,
    /// Readings older than this are stale
    pub liveness: Duration,
    /// Consecutive transport failures tolerated before giving up
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub join_timeout: Duration,
}

impl ChannelConfig {
    pub fn gsr() -> Self {
        Self {
            kind: SignalKind::Gsr,
            range: ValueRange::new(0.0, 100.0),
            history_capacity: 1000,
            liveness: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            join_timeout: Duration::from_secs(2),
        }
    }

    pub fn hr() -> Self {
        Self {
            kind: SignalKind::Hr,
            range: ValueRange::new(30.0, 220.0),
            ..Self::gsr()
        }
    }
}

/// Read access to a channel, as used by the calibrator and collector.
pub trait SensorFeed: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// Most recent reading, or `None` if stale or never received.
    fn read_latest(&self) -> Option<SensorReading>;

    /// History entries no older than `window`.
    fn readings_since(&self, window: Duration) -> Vec<SensorReading>;

    fn is_connected(&self) -> bool;
}

/// State shared between the worker and the readers.
#[derive(Debug)]
struct Shared {
    kind: SignalKind,
    slot: LatestSlot,
    history: Mutex<VecDeque<SensorReading>>,
    capacity: usize,
    /// Stop signal for the worker
    running: AtomicBool,
    transport_open: AtomicBool,
    /// Nanoseconds after `epoch` at which the worker started
    started_nanos: AtomicU64,
    epoch: Instant,
}

impl Shared {
    fn new(config: &ChannelConfig) -> Self {
        Self {
            kind: config.kind,
            slot: LatestSlot::new(),
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity)),
            capacity: config.history_capacity.max(1),
            running: AtomicBool::new(false),
            transport_open: AtomicBool::new(false),
            started_nanos: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn record(&self, reading: SensorReading) {
        self.slot.publish(&reading);
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(reading);
    }

    fn mark_started(&self) {
        let nanos = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.started_nanos.store(nanos, Ordering::SeqCst);
    }

    fn running_for(&self) -> Duration {
        let started = Duration::from_nanos(self.started_nanos.load(Ordering::SeqCst));
        self.epoch.elapsed().saturating_sub(started)
    }
}

/// Cheap cloneable read handle onto a channel.
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    shared: Arc<Shared>,
    liveness: Duration,
}

impl ChannelFeed {
    /// Number of readings currently held in history.
    pub fn history_len(&self) -> usize {
        self.shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SensorFeed for ChannelFeed {
    fn kind(&self) -> SignalKind {
        self.shared.kind
    }

    fn read_latest(&self) -> Option<SensorReading> {
        self.shared
            .slot
            .load()
            .filter(|reading| reading.at.elapsed() <= self.liveness)
    }

    fn readings_since(&self, window: Duration) -> Vec<SensorReading> {
        let history = self
            .shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match Instant::now().checked_sub(window) {
            Some(cutoff) => history.iter().filter(|r| r.at >= cutoff).copied().collect(),
            None => history.iter().copied().collect(),
        }
    }

    fn is_connected(&self) -> bool {
        if !self.shared.transport_open.load(Ordering::SeqCst) {
            return false;
        }
        let has_history = !self
            .shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        has_history
            || (self.shared.running.load(Ordering::SeqCst)
                && self.shared.running_for() < self.liveness)
    }
}

/// A physiological signal channel with its own worker thread.
pub struct SensorChannel {
    config: ChannelConfig,
    shared: Arc<Shared>,
    source: Option<Box<dyn SampleSource>>,
    handle: Option<JoinHandle<Box<dyn SampleSource>>>,
    telemetry: SharedTelemetry,
}

impl SensorChannel {
    /// Create a channel reading from `source`.
    pub fn new(
        config: ChannelConfig,
        source: Box<dyn SampleSource>,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(&config)),
            config,
            source: Some(source),
            handle: None,
            telemetry,
        }
    }

    /// Create a channel with no source; it never connects.
    pub fn unconnected(config: ChannelConfig, telemetry: SharedTelemetry) -> Self {
        Self {
            shared: Arc::new(Shared::new(&config)),
            config,
            source: None,
            handle: None,
            telemetry,
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.config.kind
    }

    /// Read handle for other components.
    pub fn feed(&self) -> ChannelFeed {
        ChannelFeed {
            shared: self.shared.clone(),
            liveness: self.config.liveness,
        }
    }

    /// Launch the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The channel is already running
    /// - The channel has no source (never had one, or lost it to a detached worker)
    pub fn start(&mut self) -> Result<(), ChannelError> {
        let name = self.config.kind.name();
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(ChannelError::AlreadyRunning(name));
        }
        let source = self.source.take().ok_or(ChannelError::NoSource(name))?;

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.mark_started();

        let shared = self.shared.clone();
        let config = self.config.clone();
        let telemetry = self.telemetry.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-channel", name.to_lowercase()))
            .spawn(move || run_worker(source, &shared, &config, &telemetry))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                ChannelError::Spawn(name, e.to_string())
            })?;

        info!(channel = name, "Sensor channel started");
        self.handle = Some(handle);
        Ok(())
    }

    /// Signal the worker and wait up to the join timeout.
    ///
    /// A worker that does not finish in time is detached.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);

        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + self.config.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(WAIT_STEP);
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => error!(channel = %self.config.kind, "Channel worker panicked"),
            }
            debug!(channel = %self.config.kind, "Sensor channel stopped");
        } else {
            warn!(
                channel = %self.config.kind,
                timeout_ms = self.config.join_timeout.as_millis() as u64,
                "Channel worker did not stop in time, detaching"
            );
        }
        self.shared.transport_open.store(false, Ordering::SeqCst);
    }

    /// Whether the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn read_latest(&self) -> Option<SensorReading> {
        self.feed().read_latest()
    }

    pub fn readings_since(&self, window: Duration) -> Vec<SensorReading> {
        self.feed().readings_since(window)
    }

    pub fn is_connected(&self) -> bool {
        self.feed().is_connected()
    }
}

impl Drop for SensorChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop. Returns the source so a stopped channel can be restarted.
fn run_worker(
    mut source: Box<dyn SampleSource>,
    shared: &Shared,
    config: &ChannelConfig,
    telemetry: &SharedTelemetry,
) -> Box<dyn SampleSource> {
    let mut failures: u32 = 0;

    while shared.running.load(Ordering::SeqCst) {
        if !source.is_open() {
            match source.open() {
                Ok(()) => {
                    shared.transport_open.store(true, Ordering::SeqCst);
                    info!(channel = %config.kind, source = source.name(), "Transport opened");
                }
                Err(e) => {
                    telemetry.record_transport_error();
                    failures += 1;
                    warn!(channel = %config.kind, error = %e, attempt = failures, "Open failed");
                    if failures > config.max_retries {
                        error!(channel = %config.kind, "Giving up on transport, channel disconnected");
                        break;
                    }
                    sleep_while_running(shared, config.retry_delay);
                    continue;
                }
            }
        }

        match source.next_sample() {
            Ok(Some(raw)) => {
                failures = 0;
                let reading = SensorReading::from_raw(config.kind, raw, &config.range, Instant::now());
                if !config.range.contains(raw.value) {
                    telemetry.record_out_of_range();
                    debug!(channel = %config.kind, value = raw.value, "Out-of-range sample");
                }
                telemetry.record_reading(config.kind);
                shared.record(reading);
            }
            Ok(None) => {}
            Err(e) => {
                telemetry.record_transport_error();
                failures += 1;
                warn!(channel = %config.kind, error = %e, attempt = failures, "Transport read failed");
                source.close();
                shared.transport_open.store(false, Ordering::SeqCst);
                if failures > config.max_retries {
                    error!(channel = %config.kind, "Giving up on transport, channel disconnected");
                    break;
                }
                sleep_while_running(shared, config.retry_delay);
            }
        }
    }

    source.close();
    shared.transport_open.store(false, Ordering::SeqCst);
    shared.running.store(false, Ordering::SeqCst);
    source
}

fn sleep_while_running(shared: &Shared, delay: Duration) {
    let deadline = Instant::now() + delay;
    while shared.running.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(WAIT_STEP.min(delay));
    }
}
