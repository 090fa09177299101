//! Shared secret: AEAD key for session frames and HMAC key for hellos

use crate::error::SyncError;
use crate::logging::*;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// 32-byte key derived from an operator passphrase
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
	key: [u8; 32],
}

impl fmt::Debug for SharedSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SharedSecret(..)")
	}
}

impl SharedSecret {
	/// SHA-256 of the trimmed passphrase
	pub fn from_passphrase(passphrase: &str) -> Self {
		let digest = Sha256::digest(passphrase.trim().as_bytes());
		let mut key = [0u8; 32];
		key.copy_from_slice(&digest);
		SharedSecret { key }
	}

	pub fn cipher(&self) -> ChaCha20Poly1305 {
		ChaCha20Poly1305::new((&self.key).into())
	}

	fn mac(&self, device_id: &str, tcp_port: u16, ts: i64) -> Option<HmacSha256> {
		let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key).ok()?;
		mac.update(format!("{}|{}|{}", device_id, tcp_port, ts).as_bytes());
		Some(mac)
	}

	/// Hex HMAC-SHA256 over `deviceId|tcpPort|ts`
	pub fn hello_auth(&self, device_id: &str, tcp_port: u16, ts: i64) -> String {
		self.mac(device_id, tcp_port, ts)
			.map(|mac| hex::encode(mac.finalize().into_bytes()))
			.unwrap_or_default()
	}

	/// Check a hello signature and that `ts` lies within `window_secs` of `now`
	pub fn verify_hello(
		&self,
		device_id: &str,
		tcp_port: u16,
		ts: i64,
		auth: &str,
		now: i64,
		window_secs: i64,
	) -> bool {
		if auth.is_empty() || ts == 0 {
			return false;
		}
		if (now - ts).abs() > window_secs {
			return false;
		}
		let Ok(tag) = hex::decode(auth) else {
			return false;
		};
		let Some(mac) = self.mac(device_id, tcp_port, ts) else {
			return false;
		};
		// Constant-time comparison
		mac.verify_slice(&tag).is_ok()
	}
}

/// Resolve the shared secret from the environment.
///
/// `Ok(Some(_))` when `secret_var` is set, `Ok(None)` when unset but
/// `insecure_var` is `1`, an error otherwise.
pub fn load_secret(secret_var: &str, insecure_var: &str) -> Result<Option<SharedSecret>, SyncError> {
	let raw = std::env::var(secret_var).unwrap_or_default();
	let insecure = std::env::var(insecure_var).map(|v| v.trim() == "1").unwrap_or(false);
	resolve_secret(&raw, insecure, secret_var)
}

pub(crate) fn resolve_secret(
	raw: &str,
	insecure: bool,
	secret_var: &str,
) -> Result<Option<SharedSecret>, SyncError> {
	if !raw.trim().is_empty() {
		return Ok(Some(SharedSecret::from_passphrase(raw)));
	}
	if insecure {
		warn!("No shared secret: running peer sync UNAUTHENTICATED and UNENCRYPTED");
		return Ok(None);
	}
	Err(SyncError::InvalidConfig { message: format!("{} is not set", secret_var) })
}


// vim: ts=4
