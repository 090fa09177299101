//! Peer wire protocol
//!
//! - [`messages`]: JSON shapes of hellos and session messages
//! - [`codec`]: plain (JSON lines) or AEAD-sealed framing of a byte stream
//! - [`secret`]: the shared passphrase, frame key and hello signatures

pub mod codec;
pub mod error;
pub mod messages;
pub mod secret;

pub use codec::{framed, FrameReader, FrameWriter, MAX_FRAME_BYTES};
pub use error::ProtocolError;
pub use messages::{
	FilePayload, HelloMessage, SyncPayload, TeamSummary, WantPayload, WireMessage, APP_NAME,
};
pub use secret::{load_secret, SharedSecret};

// vim: ts=4
