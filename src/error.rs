//! Error types for TeamSync operations
//!
//! Nothing in the engine is fatal to the host process: network and protocol
//! failures end the current session, data conflicts are never errors at all
//! (they are recorded as `conflict` flags and conflict copies instead).

use std::error::Error;
use std::fmt;
use std::io;

pub use crate::protocol::error::ProtocolError;

/// Main error type for service and storage operations
#[derive(Debug)]
pub enum SyncError {
	/// Invalid or incomplete configuration (missing secret, bad device id, ...)
	InvalidConfig { message: String },

	/// A relative path received from a peer is unusable
	InvalidPath { path: String },

	/// I/O error
	Io(io::Error),

	/// Wire protocol failure (nested)
	Protocol(ProtocolError),

	/// Configuration document failure (nested)
	Document(DocumentError),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::InvalidPath { path } => write!(f, "Invalid team path: {:?}", path),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Protocol(e) => write!(f, "Protocol error: {}", e),
			SyncError::Document(e) => write!(f, "Document error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Protocol(e)
	}
}

impl From<DocumentError> for SyncError {
	fn from(e: DocumentError) -> Self {
		SyncError::Document(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

/// Errors loading or saving the configuration document
#[derive(Debug)]
pub enum DocumentError {
	/// Reading or writing the document file failed
	Io(io::Error),

	/// The document is not valid JSON for the expected shape
	Parse { message: String },

	/// The document was written by an incompatible version
	UnsupportedVersion { found: u32, expected: u32 },
}

impl fmt::Display for DocumentError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DocumentError::Io(e) => write!(f, "I/O error: {}", e),
			DocumentError::Parse { message } => write!(f, "Invalid document JSON: {}", message),
			DocumentError::UnsupportedVersion { found, expected } => {
				write!(f, "Unsupported document version {} (expected {})", found, expected)
			}
		}
	}
}

impl Error for DocumentError {}

impl From<io::Error> for DocumentError {
	fn from(e: io::Error) -> Self {
		DocumentError::Io(e)
	}
}

impl From<serde_json::Error> for DocumentError {
	fn from(e: serde_json::Error) -> Self {
		DocumentError::Parse { message: e.to_string() }
	}
}

// vim: ts=4
