//! Dispatch of framed messages to their owners.

use super::mailbox::{BaselineMailbox, ButtonEvent, ButtonSender, SharedDeviceMirror};
use super::message::Message;
use crate::session::texts;
use crate::session::Display;
use crate::transparency::SharedTelemetry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the router did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// A conductance sample for the worker that owns the GSR channel
    Sample(f64),
    /// Delivered to a queue, mailbox, mirror or the display
    Handled,
    /// Unknown or malformed, discarded
    Dropped,
}

/// Routes each frame by prefix to exactly one handler.
#[derive(Clone)]
pub struct Router {
    buttons: ButtonSender,
    baseline: BaselineMailbox,
    device: SharedDeviceMirror,
    display: Option<Arc<dyn Display>>,
    telemetry: SharedTelemetry,
}

impl Router {
    pub fn new(
        buttons: ButtonSender,
        baseline: BaselineMailbox,
        device: SharedDeviceMirror,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            buttons,
            baseline,
            device,
            display: None,
            telemetry,
        }
    }

    /// Forward progress and LCD text to a display.
    pub fn with_display(mut self, display: Arc<dyn Display>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn route(&self, frame: &str) -> Routed {
        self.telemetry.record_frame_received();

        let message = match frame.parse::<Message>() {
            Ok(message) => message,
            Err(crate::error::ParseError::UnknownPrefix(_)) => {
                debug!(frame, "Discarding frame with unknown prefix");
                self.telemetry.record_frame_dropped();
                return Routed::Dropped;
            }
            Err(e) => {
                warn!(frame, error = %e, "Discarding malformed frame");
                self.telemetry.record_frame_dropped();
                return Routed::Dropped;
            }
        };

        match message {
            Message::Conductance(value) => return Routed::Sample(value),
            Message::Button(kind) => {
                info!(?kind, "Button pressed");
                self.buttons.push(ButtonEvent::new(kind));
            }
            Message::Baseline { gsr, hr } => {
                info!(gsr, hr, "Device reported baseline");
                self.baseline.post(gsr, hr);
            }
            Message::BaselineProgress { current, total } => {
                debug!(current, total, "Baseline progress");
                self.show(&texts::baseline_collection(current, total));
            }
            Message::Calibration(marker) => {
                if self.device.update_calibration(marker) {
                    info!(?marker, "Device calibration marker");
                } else {
                    debug!(?marker, "Repeated calibration marker");
                }
            }
            Message::SessionStarted => {
                if self.device.mark_session_started() {
                    info!("Device reported session start");
                } else {
                    debug!("Repeated session start marker");
                }
            }
            Message::Status(status) => {
                if self.device.update_status(status) {
                    info!(%status, "Device status changed");
                } else {
                    debug!(%status, "Device status unchanged");
                }
            }
            Message::Lcd(text) => self.show(&text),
        }
        Routed::Handled
    }

    fn show(&self, text: &str) {
        if let Some(display) = &self.display {
            display.show(text);
        }
    }
}
