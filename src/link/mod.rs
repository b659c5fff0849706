//! Serial link to the microcontroller.
//!
//! This module contains:
//! - Byte transports (serial port and replay)
//! - The line framer that turns bytes into cleaned text frames
//! - The message grammar of the device protocol
//! - The router that hands each message to its owner

pub mod framer;
pub mod mailbox;
pub mod message;
pub mod router;
pub mod transport;

// Re-export commonly used types
pub use framer::Framer;
pub use mailbox::{
    button_queue, BaselineMailbox, ButtonEvent, ButtonReceiver, ButtonSender, DeviceBaseline,
    DeviceMirror, SharedDeviceMirror,
};
pub use message::{ButtonKind, CalibrationMarker, DeviceStatus, Message, MESSAGE_PREFIXES};
pub use router::{Routed, Router};
pub use transport::{ReplayTransport, SerialTransport, Transport};
