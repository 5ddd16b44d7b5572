//! Byte channels
//!
//! The [`CommunicationChannel`] seam between the line reader and whatever
//! produces bytes: a serial port or an in-memory buffer.

use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Abstraction for the byte source feeding the line reader (serial port or
/// an in-memory stand-in)
pub trait CommunicationChannel: Read + Send {
    /// Discard anything buffered on the input side
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Get number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened and configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl CommunicationChannel for SerialChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::other)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    buffer: VecDeque<u8>,
    disconnected: bool,
    pending_failure: Option<io::ErrorKind>,
    drained_failure: Option<io::ErrorKind>,
}

/// In-memory channel used by demo mode and tests.
///
/// Clones share the same buffer: one handle is given to the reader, the
/// other is kept by whoever produces the bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChannel {
    /// Empty channel with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append raw bytes as if the device had transmitted them
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.lock().buffer.extend(bytes.iter().copied());
    }

    /// Append one line followed by `\r\n` (Arduino `println`)
    pub fn push_line(&self, line: &str) {
        let mut state = self.lock();
        state.buffer.extend(line.bytes());
        state.buffer.extend(b"\r\n".iter().copied());
    }

    /// Make the next read or availability check fail once with `kind`
    pub fn fail_next(&self, kind: io::ErrorKind) {
        self.lock().pending_failure = Some(kind);
    }

    /// Fail once with `kind`, but only after every buffered byte has been
    /// consumed: the device sent some lines, then dropped out
    pub fn fail_when_drained(&self, kind: io::ErrorKind) {
        self.lock().drained_failure = Some(kind);
    }

    /// Simulate the device being unplugged; every later call fails
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Bytes not yet consumed by the reader
    pub fn pending(&self) -> usize {
        self.lock().buffer.len()
    }

    fn check_failure(state: &mut MemoryState) -> io::Result<()> {
        if state.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if let Some(kind) = state.pending_failure.take() {
            return Err(io::Error::new(kind, "injected failure"));
        }
        if state.buffer.is_empty() {
            if let Some(kind) = state.drained_failure.take() {
                return Err(io::Error::new(kind, "injected failure"));
            }
        }
        Ok(())
    }
}

impl Read for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        Self::check_failure(&mut state)?;
        if state.buffer.is_empty() {
            // A real port blocks until its timeout elapses
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.buffer.len());
        for (slot, byte) in buf.iter_mut().zip(state.buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl CommunicationChannel for MemoryChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.lock().buffer.clear();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let mut state = self.lock();
        Self::check_failure(&mut state)?;
        Ok(u32::try_from(state.buffer.len()).unwrap_or(u32::MAX))
    }
}
