//! Line reader
//!
//! Buffers bytes from a [`CommunicationChannel`] and hands them out one
//! decoded line at a time.

use serde::Serialize;
use std::io::{self, Read};
use std::time::Duration;

use super::{
    configure_port, open_port, CommunicationChannel, ProtocolError, SerialChannel,
    MAX_LINE_LENGTH,
};

/// Connection state of the telemetry channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No open attempt has been made (or the channel was closed)
    Unopened,
    /// Channel is open and being read
    Open,
    /// Opening failed; terminal for this run
    Failed(String),
}

impl ConnectionState {
    /// True only for [`ConnectionState::Open`]
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Reads newline-terminated text from the telemetry channel
pub struct ChannelReader {
    channel: Option<Box<dyn CommunicationChannel>>,
    state: ConnectionState,
    buffer: Vec<u8>,
    /// Set while skipping the remainder of an over-long line
    discarding: bool,
    rx_bytes: u64,
    rx_lines: u64,
}

/// Decode one raw line permissively: invalid UTF-8 is dropped, surrounding
/// whitespace and the line terminator are stripped.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim()
        .to_string()
}

fn map_io_error(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::Timeout,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => ProtocolError::Disconnected,
        _ => ProtocolError::IoError(e),
    }
}

impl ChannelReader {
    fn with_state(
        channel: Option<Box<dyn CommunicationChannel>>,
        state: ConnectionState,
    ) -> Self {
        Self {
            channel,
            state,
            buffer: Vec::new(),
            discarding: false,
            rx_bytes: 0,
            rx_lines: 0,
        }
    }

    /// A reader with no channel behind it
    pub fn unopened() -> Self {
        Self::with_state(None, ConnectionState::Unopened)
    }

    /// Wrap an already-open channel
    pub fn from_channel(channel: Box<dyn CommunicationChannel>) -> Self {
        Self::with_state(Some(channel), ConnectionState::Open)
    }

    /// Open the serial device.
    ///
    /// Never fails outright: an unavailable device yields a reader in
    /// [`ConnectionState::Failed`], which stays failed for its lifetime.
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Self {
        match Self::try_open(port, baud_rate, timeout) {
            Ok(channel) => {
                tracing::info!("Opened {port} at {baud_rate} baud");
                Self::from_channel(Box::new(channel))
            }
            Err(e) => {
                tracing::error!("Serial error: {e}");
                Self::with_state(None, ConnectionState::Failed(e.to_string()))
            }
        }
    }

    fn try_open(
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<SerialChannel, ProtocolError> {
        let mut handle = open_port(port, baud_rate, timeout)?;
        configure_port(handle.as_mut())?;
        let mut channel = SerialChannel::new(handle);
        // Stale bytes from before we attached may hold half a line
        if let Err(e) = channel.clear_input_buffer() {
            tracing::debug!("Could not clear input buffer on {port}: {e}");
        }
        Ok(channel)
    }

    /// Current connection state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// True while the channel is open
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Total bytes and lines received so far
    pub fn counters(&self) -> (u64, u64) {
        (self.rx_bytes, self.rx_lines)
    }

    /// Close the channel. The reader returns to [`ConnectionState::Unopened`]
    /// unless it had failed, which stays recorded.
    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            tracing::info!(
                "Channel closed after {} bytes, {} lines",
                self.rx_bytes,
                self.rx_lines
            );
        }
        self.buffer.clear();
        self.discarding = false;
        if self.state.is_open() {
            self.state = ConnectionState::Unopened;
        }
    }

    fn has_complete_line(&self) -> bool {
        self.buffer.contains(&b'\n')
    }

    fn overflowed(&self) -> bool {
        !self.has_complete_line() && self.buffer.len() > MAX_LINE_LENGTH
    }

    /// Drop the tail of an over-long line once it shows up
    fn skip_discarded(&mut self) {
        if !self.discarding {
            return;
        }
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                self.buffer.drain(..=pos);
                self.discarding = false;
            }
            None => self.buffer.clear(),
        }
    }

    fn channel_mut(&mut self) -> Result<&mut Box<dyn CommunicationChannel>, ProtocolError> {
        if !self.state.is_open() {
            return Err(ProtocolError::NotConnected);
        }
        self.channel.as_mut().ok_or(ProtocolError::NotConnected)
    }

    /// Read at most `limit` bytes into the line buffer
    fn fill(&mut self, limit: usize) -> Result<usize, ProtocolError> {
        let mut chunk = [0u8; 256];
        let want = limit.min(chunk.len());
        let channel = self.channel_mut()?;
        let n = loop {
            match channel.read(&mut chunk[..want]) {
                Ok(0) => return Err(ProtocolError::Disconnected),
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(e)),
            }
        };
        self.buffer.extend_from_slice(&chunk[..n]);
        self.rx_bytes += n as u64;
        Ok(n)
    }

    /// Whether a complete line can be read without waiting on the device.
    ///
    /// Pulls whatever the driver already holds into the line buffer; never
    /// blocks beyond that.
    pub fn has_pending_data(&mut self) -> Result<bool, ProtocolError> {
        self.skip_discarded();
        if self.has_complete_line() || self.overflowed() {
            return Ok(true);
        }

        let available = self
            .channel_mut()?
            .bytes_to_read()
            .map_err(map_io_error)? as usize;
        let mut remaining = available;
        while remaining > 0 {
            remaining -= self.fill(remaining)?.min(remaining);
        }

        self.skip_discarded();
        Ok(self.has_complete_line() || self.overflowed())
    }

    /// Read one line, blocking up to the channel timeout if none is buffered
    pub fn read_line(&mut self) -> Result<String, ProtocolError> {
        loop {
            self.skip_discarded();

            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                if raw.len() > MAX_LINE_LENGTH + 1 {
                    return Err(ProtocolError::LineTooLong {
                        limit: MAX_LINE_LENGTH,
                    });
                }
                self.rx_lines += 1;
                return Ok(decode_line(&raw));
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                self.buffer.clear();
                self.discarding = true;
                return Err(ProtocolError::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                });
            }

            self.fill(usize::MAX)?;
        }
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        self.close();
    }
}
