//! Protocol error types
//!
//! Any of these aborts the current sync session only; the next scheduled
//! tick starts over from a fresh connection.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error on the underlying stream
	Io(io::Error),
	/// JSON encode/decode error
	Json(String),
	/// Base64 decoding error in a file payload
	Base64(String),
	/// Frame length prefix above the hard cap
	FrameTooLarge { size: usize, max: usize },
	/// Zero-length or truncated frame
	InvalidFrame(String),
	/// AEAD seal/open failure (wrong key or tampered frame)
	Crypto(String),
	/// The session deadline or dial timeout elapsed
	Timeout,
	/// The peer closed the connection
	Closed,
	/// Protocol violation (unexpected message or state)
	ProtocolViolation(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Json(msg) => write!(f, "JSON error: {}", msg),
			ProtocolError::Base64(msg) => write!(f, "Base64 decode error: {}", msg),
			ProtocolError::FrameTooLarge { size, max } => {
				write!(f, "Frame of {} bytes exceeds maximum {}", size, max)
			}
			ProtocolError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
			ProtocolError::Crypto(msg) => write!(f, "Crypto error: {}", msg),
			ProtocolError::Timeout => write!(f, "Operation timed out"),
			ProtocolError::Closed => write!(f, "Connection closed by peer"),
			ProtocolError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			return ProtocolError::Closed;
		}
		ProtocolError::Io(e)
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Json(e.to_string())
	}
}

impl From<base64::DecodeError> for ProtocolError {
	fn from(e: base64::DecodeError) -> Self {
		ProtocolError::Base64(e.to_string())
	}
}

impl From<tokio::time::error::Elapsed> for ProtocolError {
	fn from(_: tokio::time::error::Elapsed) -> Self {
		ProtocolError::Timeout
	}
}

// vim: ts=4
