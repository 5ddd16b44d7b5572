//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the telemetry device
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The device could not be opened or configured
    #[error("Failed to open {port}: {reason}")]
    OpenFailed {
        /// Requested device
        port: String,
        /// Driver error text
        reason: String,
    },

    /// Driver-level failure on an open port
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No data before the read timeout
    #[error("Read timeout")]
    Timeout,

    /// The device went away
    #[error("Device disconnected")]
    Disconnected,

    /// Read attempted without an open channel
    #[error("Not connected")]
    NotConnected,

    /// A line longer than the buffer limit was thrown away
    #[error("Line exceeded {limit} bytes and was discarded")]
    LineTooLong {
        /// Longest accepted line, in bytes
        limit: usize,
    },

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// True when the failure only spoiled the line being read, so the
    /// rest of the buffered input can still be drained.
    pub fn is_line_local(&self) -> bool {
        matches!(self, ProtocolError::LineTooLong { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_local_classification() {
        assert!(ProtocolError::LineTooLong { limit: 8 }.is_line_local());
        assert!(!ProtocolError::Timeout.is_line_local());
        assert!(!ProtocolError::Disconnected.is_line_local());
    }

    #[test]
    fn test_open_failed_display() {
        let err = ProtocolError::OpenFailed {
            port: "COM4".to_string(),
            reason: "The system cannot find the file specified.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open COM4: The system cannot find the file specified."
        );
    }
}
