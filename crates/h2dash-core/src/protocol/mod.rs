//! Serial Telemetry Channel
//!
//! Owns the link to the vehicle microcontroller and turns its byte stream
//! into lines of text.
//!
//! The device speaks a fixed, newline-terminated ASCII convention with no
//! handshake; see [`crate::classifier`] for the recognised line shapes.

mod error;
pub mod reader;
pub mod serial;
pub mod stream;

pub use error::ProtocolError;
pub use reader::{ChannelReader, ConnectionState};
pub use serial::{configure_port, list_ports, open_port, PortInfo};
pub use stream::{CommunicationChannel, MemoryChannel, SerialChannel};

/// Default baud rate of the vehicle firmware (`Serial.begin(9600)`)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Longest line accepted before the partial text is discarded
pub const MAX_LINE_LENGTH: usize = 1024;
