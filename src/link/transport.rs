//! Byte transports underneath the line protocol.
//!
//! A transport is opened and closed explicitly by the channel worker that owns
//! it; `read` returning `Ok(0)` means no bytes arrived within the poll timeout.

use crate::error::TransportError;
use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// A readable byte link with explicit open/close.
pub trait Transport: Send {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Acquire the underlying resource.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Read available bytes, blocking at most one poll interval.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Release the underlying resource. Safe to call when already closed.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Serial port transport backed by the `serialport` crate.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout,
            port: None,
        }
    }

    /// List available serial ports.
    #[must_use]
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: self.port_name.clone(),
                reason: e.to_string(),
            })?;
        self.port = Some(port);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen(self.port_name.clone()))?;

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(TransportError::Read {
                port: self.port_name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn close(&mut self) {
        // Dropping the boxed port closes the file descriptor.
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

/// One scripted step of a replay.
#[derive(Debug, Clone)]
enum ReplayStep {
    Bytes(Vec<u8>),
    Fail(String),
}

/// Replays recorded bytes as if they arrived over a serial link.
///
/// Chunks are handed out one per `read`, with `pace` slept before each one.
/// Once the script is exhausted the transport behaves like an idle line.
pub struct ReplayTransport {
    name: String,
    steps: VecDeque<ReplayStep>,
    pace: Duration,
    idle_poll: Duration,
    open: bool,
    fail_open: u32,
}

impl ReplayTransport {
    /// Replay the given chunks verbatim.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self {
            name: "replay".to_string(),
            steps: chunks
                .into_iter()
                .map(|c| ReplayStep::Bytes(c.as_ref().to_vec()))
                .collect(),
            pace: Duration::ZERO,
            idle_poll: Duration::from_millis(5),
            open: false,
            fail_open: 0,
        }
    }

    /// Replay text lines, one newline-terminated chunk each.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_chunks(lines.into_iter().map(|l| format!("{}\n", l.as_ref())))
    }

    /// Replay a recorded capture file line by line.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut replay = Self::from_lines(content.lines());
        replay.name = path.display().to_string();
        Ok(replay)
    }

    /// Delay before each chunk is delivered.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Make the next `count` open attempts fail.
    pub fn failing_opens(mut self, count: u32) -> Self {
        self.fail_open = count;
        self
    }

    /// Append a read failure after the chunks queued so far.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.steps.push_back(ReplayStep::Fail(reason.into()));
        self
    }

    /// Append more lines after the steps queued so far.
    pub fn then_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.steps
                .push_back(ReplayStep::Bytes(format!("{}\n", line.as_ref()).into_bytes()));
        }
        self
    }

    /// Number of steps not yet replayed.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl Transport for ReplayTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.fail_open > 0 {
            self.fail_open -= 1;
            return Err(TransportError::Open {
                port: self.name.clone(),
                reason: "scripted open failure".to_string(),
            });
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen(self.name.clone()));
        }

        match self.steps.pop_front() {
            Some(ReplayStep::Bytes(mut bytes)) => {
                if !self.pace.is_zero() {
                    std::thread::sleep(self.pace);
                }
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    // Hand the remainder out on the next read
                    self.steps.push_front(ReplayStep::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(ReplayStep::Fail(reason)) => Err(TransportError::Read {
                port: self.name.clone(),
                reason,
            }),
            None => {
                std::thread::sleep(self.idle_poll);
                Ok(0)
            }
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
