//! Bounded hand-off points between the router and its consumers.
//!
//! The router runs on a channel worker thread and must never block, so every
//! consumer gets either a bounded queue with drop-oldest overflow or a
//! single-slot mailbox that the newest message overwrites.

use super::message::{ButtonKind, CalibrationMarker, DeviceStatus};
use crate::transparency::SharedTelemetry;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// A button press as delivered to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonEvent {
    pub kind: ButtonKind,
    pub at: Instant,
}

impl ButtonEvent {
    pub fn new(kind: ButtonKind) -> Self {
        Self {
            kind,
            at: Instant::now(),
        }
    }
}

/// Create a bounded button queue.
pub fn button_queue(capacity: usize, telemetry: SharedTelemetry) -> (ButtonSender, ButtonReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        ButtonSender {
            tx,
            overflow: rx.clone(),
            telemetry,
        },
        ButtonReceiver { rx },
    )
}

/// Producer half of the button queue. Cloneable.
#[derive(Clone)]
pub struct ButtonSender {
    tx: Sender<ButtonEvent>,
    // Used only to evict the oldest event when the queue is full
    overflow: Receiver<ButtonEvent>,
    telemetry: SharedTelemetry,
}

impl ButtonSender {
    /// Enqueue without blocking; on overflow the oldest event is discarded.
    pub fn push(&self, event: ButtonEvent) {
        self.telemetry.record_button_event();
        let mut pending = event;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if let Ok(dropped) = self.overflow.try_recv() {
                        warn!(kind = ?dropped.kind, "Button queue full, dropping oldest event");
                        self.telemetry.record_button_dropped();
                    }
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Button queue has no consumer");
                    return;
                }
            }
        }
    }
}

/// Consumer half of the button queue.
#[derive(Clone)]
pub struct ButtonReceiver {
    rx: Receiver<ButtonEvent>,
}

impl ButtonReceiver {
    /// Take at most one pending event without blocking.
    pub fn poll(&self) -> Option<ButtonEvent> {
        self.rx.try_recv().ok()
    }

    /// Consume one pending event and report whether it was a Stop press.
    ///
    /// A Start press consumed here is ignored: the session is already active.
    pub fn poll_stop(&self) -> bool {
        match self.poll() {
            Some(event) if event.kind == ButtonKind::Stop => true,
            Some(event) => {
                debug!(kind = ?event.kind, "Ignoring button while session is busy");
                false
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Discard everything queued so far.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Baseline reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceBaseline {
    pub gsr: f64,
    pub hr: f64,
    pub received_at: Instant,
}

/// Single-slot mailbox for `BASELINE:` reports; newer reports overwrite.
#[derive(Debug, Clone, Default)]
pub struct BaselineMailbox {
    slot: Arc<Mutex<Option<DeviceBaseline>>>,
}

impl BaselineMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, gsr: f64, hr: f64) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(DeviceBaseline {
            gsr,
            hr,
            received_at: Instant::now(),
        });
    }

    /// Take the pending report, leaving the mailbox empty.
    pub fn take(&self) -> Option<DeviceBaseline> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn peek(&self) -> Option<DeviceBaseline> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Last known device-side state, mirrored from status echoes.
#[derive(Debug, Default)]
pub struct DeviceMirror {
    status: Mutex<Option<DeviceStatus>>,
    calibration: Mutex<Option<CalibrationMarker>>,
    session_started: AtomicBool,
}

impl DeviceMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a status echo. Returns true if it differs from the previous one.
    pub fn update_status(&self, status: DeviceStatus) -> bool {
        let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *current != Some(status);
        *current = Some(status);
        changed
    }

    pub fn update_calibration(&self, marker: CalibrationMarker) -> bool {
        let mut current = self
            .calibration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let changed = *current != Some(marker);
        *current = Some(marker);
        changed
    }

    /// Returns true the first time the device reports a session start.
    pub fn mark_session_started(&self) -> bool {
        !self.session_started.swap(true, Ordering::Relaxed)
    }

    pub fn status(&self) -> Option<DeviceStatus> {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calibration(&self) -> Option<CalibrationMarker> {
        *self
            .calibration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared device mirror.
pub type SharedDeviceMirror = Arc<DeviceMirror>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_telemetry;

    #[test]
    fn test_button_queue_drops_oldest() {
        let telemetry = create_shared_telemetry();
        let (tx, rx) = button_queue(2, telemetry.clone());

        tx.push(ButtonEvent::new(ButtonKind::Start));
        tx.push(ButtonEvent::new(ButtonKind::Stop));
        tx.push(ButtonEvent::new(ButtonKind::Start));

        assert_eq!(rx.pending(), 2);
        assert_eq!(rx.poll().map(|e| e.kind), Some(ButtonKind::Stop));
        assert_eq!(rx.poll().map(|e| e.kind), Some(ButtonKind::Start));
        assert!(rx.poll().is_none());

        let stats = telemetry.stats();
        assert_eq!(stats.button_events, 3);
        assert_eq!(stats.buttons_dropped, 1);
    }

    #[test]
    fn test_poll_stop_consumes_one_event() {
        let (tx, rx) = button_queue(8, create_shared_telemetry());
        tx.push(ButtonEvent::new(ButtonKind::Start));
        tx.push(ButtonEvent::new(ButtonKind::Stop));

        assert!(!rx.poll_stop());
        assert!(rx.poll_stop());
        assert!(!rx.poll_stop());
    }

    #[test]
    fn test_baseline_mailbox_overwrites() {
        let mailbox = BaselineMailbox::new();
        assert!(mailbox.take().is_none());

        mailbox.post(3.0, 65.0);
        mailbox.post(4.0, 70.0);
        let baseline = mailbox.take().unwrap();
        assert_eq!((baseline.gsr, baseline.hr), (4.0, 70.0));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_device_mirror_change_detection() {
        let mirror = DeviceMirror::new();
        assert!(mirror.update_status(DeviceStatus::Idle));
        assert!(!mirror.update_status(DeviceStatus::Idle));
        assert!(mirror.update_status(DeviceStatus::Calibrating));
        assert_eq!(mirror.status(), Some(DeviceStatus::Calibrating));

        assert!(mirror.mark_session_started());
        assert!(!mirror.mark_session_started());
    }
}
