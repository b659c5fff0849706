//! Sample sources feeding the channel workers.
//!
//! A source wraps a transport and turns its bytes into raw samples for one
//! signal. The device link source also routes every non-sample message it
//! sees, since buttons and baseline reports share the wire with GSR data.

use super::types::RawSample;
use crate::error::{ParseError, TransportError};
use crate::link::framer::Framer;
use crate::link::message::parse_finite;
use crate::link::router::{Routed, Router};
use crate::link::transport::Transport;
use crate::transparency::SharedTelemetry;
use std::collections::VecDeque;
use tracing::{debug, warn};

const READ_CHUNK: usize = 256;

/// Something a channel worker can pull samples from.
pub trait SampleSource: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<(), TransportError>;

    /// Next sample, or `None` if nothing arrived within one poll.
    fn next_sample(&mut self) -> Result<Option<RawSample>, TransportError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// The microcontroller link: GSR samples plus routed control messages.
pub struct DeviceLinkSource<T: Transport> {
    transport: T,
    framer: Framer,
    router: Router,
    pending: VecDeque<RawSample>,
}

impl<T: Transport> DeviceLinkSource<T> {
    pub fn new(transport: T, framer: Framer, router: Router) -> Self {
        Self {
            transport,
            framer,
            router,
            pending: VecDeque::new(),
        }
    }
}

impl<T: Transport> SampleSource for DeviceLinkSource<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        self.framer.reset();
        self.transport.open()
    }

    fn next_sample(&mut self) -> Result<Option<RawSample>, TransportError> {
        if let Some(sample) = self.pending.pop_front() {
            return Ok(Some(sample));
        }

        let mut buf = [0u8; READ_CHUNK];
        let n = self.transport.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }

        self.framer.feed(&buf[..n]);
        while let Some(frame) = self.framer.next_frame() {
            if let Routed::Sample(value) = self.router.route(&frame) {
                self.pending.push_back(RawSample::new(value));
            }
        }
        Ok(self.pending.pop_front())
    }

    fn close(&mut self) {
        self.transport.close();
        self.framer.reset();
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.transport.is_open()
    }
}

/// Prefix of heart-rate bridge frames.
pub const HR_PREFIX: &str = "HR:";
const HR_PREFIXES: &[&str] = &[HR_PREFIX];

/// Heart-rate bridge: a line transport carrying `HR:<bpm>[,CONTACT:<0|1>]`.
pub struct HrBridgeSource<T: Transport> {
    transport: T,
    framer: Framer,
    telemetry: SharedTelemetry,
    pending: VecDeque<RawSample>,
}

impl<T: Transport> HrBridgeSource<T> {
    pub fn new(transport: T, max_line: usize, telemetry: SharedTelemetry) -> Self {
        Self {
            transport,
            framer: Framer::with_max_line(HR_PREFIXES, max_line),
            telemetry,
            pending: VecDeque::new(),
        }
    }
}

/// Parse one heart-rate bridge frame.
pub fn parse_hr_frame(frame: &str) -> Result<RawSample, ParseError> {
    let payload = frame
        .strip_prefix(HR_PREFIX)
        .ok_or_else(|| ParseError::UnknownPrefix(frame.to_string()))?;

    let malformed = || ParseError::MalformedPayload {
        prefix: HR_PREFIX,
        payload: payload.to_string(),
    };

    let mut parts = payload.split(',');
    let bpm = parse_finite(parts.next().unwrap_or_default(), "heart rate")?;
    let contact = match parts.next() {
        None => true,
        Some(part) => match part.trim().strip_prefix("CONTACT:").map(str::trim) {
            Some("1") => true,
            Some("0") => false,
            _ => return Err(malformed()),
        },
    };
    if parts.next().is_some() {
        return Err(malformed());
    }
    Ok(RawSample::with_contact(bpm, contact))
}

impl<T: Transport> SampleSource for HrBridgeSource<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        self.framer.reset();
        self.transport.open()
    }

    fn next_sample(&mut self) -> Result<Option<RawSample>, TransportError> {
        if let Some(sample) = self.pending.pop_front() {
            return Ok(Some(sample));
        }

        let mut buf = [0u8; READ_CHUNK];
        let n = self.transport.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }

        self.framer.feed(&buf[..n]);
        while let Some(frame) = self.framer.next_frame() {
            self.telemetry.record_frame_received();
            match parse_hr_frame(&frame) {
                Ok(sample) => self.pending.push_back(sample),
                Err(ParseError::UnknownPrefix(_)) => {
                    debug!(frame = %frame, "Discarding non-HR frame");
                    self.telemetry.record_frame_dropped();
                }
                Err(e) => {
                    warn!(frame = %frame, error = %e, "Discarding malformed HR frame");
                    self.telemetry.record_frame_dropped();
                }
            }
        }
        Ok(self.pending.pop_front())
    }

    fn close(&mut self) {
        self.transport.close();
        self.framer.reset();
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.transport.is_open()
    }
}
