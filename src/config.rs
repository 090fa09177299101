//! Engine settings
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (TOML, or JSON5 for any other extension)
//! 3. Environment variables (`TEAMSYNC_*` prefix)
//! 4. CLI flags (highest priority, applied by the caller)
//!
//! This is the engine's own tuning, distinct from the replicated
//! configuration document in [`crate::model`].

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known discovery port
pub const DEFAULT_UDP_PORT: u16 = 43277;

pub const ENV_PREFIX: &str = "TEAMSYNC_";
pub const DEFAULT_SECRET_ENV: &str = "TEAMSYNC_P2P_SECRET";
pub const DEFAULT_INSECURE_ENV: &str = "TEAMSYNC_P2P_INSECURE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// NETWORK
	// ========================================================================
	/// UDP port for hello broadcasts (send and receive)
	pub udp_port: u16,

	/// TCP listen address for sync sessions; port 0 picks a free port
	pub listen_addr: String,

	/// Receive buffer for hello datagrams
	pub udp_buffer_size: usize,

	// ========================================================================
	// TIMING
	// ========================================================================
	pub announce_interval_secs: u64,

	/// How often the scheduler looks for peers due a sync
	pub sync_interval_secs: u64,

	/// A peer not heard from for this long is skipped
	pub peer_ttl_secs: u64,

	pub dial_timeout_secs: u64,

	/// Deadline for a whole sync session
	pub session_timeout_secs: u64,

	/// Accepted clock skew for signed hellos
	pub hello_auth_window_secs: i64,

	// ========================================================================
	// LIMITS
	// ========================================================================
	pub max_frame_bytes: usize,

	/// Paths per want message
	pub want_batch_size: usize,

	// ========================================================================
	// STORAGE
	// ========================================================================
	/// Root of per-team file storage (`<dataDir>/teams/<teamId>`)
	pub data_dir: PathBuf,

	/// Glob patterns excluded from team manifests
	pub exclude_patterns: Vec<String>,

	// ========================================================================
	// SECURITY
	// ========================================================================
	/// Environment variable holding the shared passphrase
	pub secret_env: String,

	/// Environment variable that, set to `1`, allows running without a secret
	pub insecure_env: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			udp_port: DEFAULT_UDP_PORT,
			listen_addr: "0.0.0.0:0".to_string(),
			udp_buffer_size: 8192,

			announce_interval_secs: 3,
			sync_interval_secs: 6,
			peer_ttl_secs: 18,
			dial_timeout_secs: 8,
			session_timeout_secs: 25,
			hello_auth_window_secs: 45,

			max_frame_bytes: crate::protocol::MAX_FRAME_BYTES,
			want_batch_size: 200,

			data_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".teamsync"))
				.unwrap_or_else(|| PathBuf::from(".teamsync")),
			exclude_patterns: vec![],

			secret_env: DEFAULT_SECRET_ENV.to_string(),
			insecure_env: DEFAULT_INSECURE_ENV.to_string(),
		}
	}
}

impl Config {
	/// Defaults, then `path` if given, then the process environment
	pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Config::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	/// Parse a settings file; `.toml` as TOML, anything else as JSON5
	pub fn from_file(path: &Path) -> Result<Self, SyncError> {
		let text = std::fs::read_to_string(path)?;
		let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
		let parsed = if is_toml {
			toml::from_str(&text).map_err(|e| e.to_string())
		} else {
			json5::from_str(&text).map_err(|e| e.to_string())
		};
		parsed.map_err(|message| SyncError::InvalidConfig {
			message: format!("{}: {}", path.display(), message),
		})
	}

	/// Override fields from `TEAMSYNC_*` variables found by `lookup`
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

		if let Some(v) = get("UDP_PORT") {
			self.udp_port = parse_env("UDP_PORT", &v)?;
		}
		if let Some(v) = get("LISTEN_ADDR") {
			self.listen_addr = v.trim().to_string();
		}
		if let Some(v) = get("SYNC_INTERVAL_SECS") {
			self.sync_interval_secs = parse_env("SYNC_INTERVAL_SECS", &v)?;
		}
		if let Some(v) = get("ANNOUNCE_INTERVAL_SECS") {
			self.announce_interval_secs = parse_env("ANNOUNCE_INTERVAL_SECS", &v)?;
		}
		if let Some(v) = get("SESSION_TIMEOUT_SECS") {
			self.session_timeout_secs = parse_env("SESSION_TIMEOUT_SECS", &v)?;
		}
		if let Some(v) = get("DATA_DIR") {
			self.data_dir = PathBuf::from(v.trim());
		}
		if let Some(v) = get("EXCLUDE") {
			self.exclude_patterns = v
				.split(',')
				.map(|p| p.trim().to_string())
				.filter(|p| !p.is_empty())
				.collect();
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		let invalid = |message: &str| Err(SyncError::InvalidConfig { message: message.to_string() });

		if self.announce_interval_secs == 0 || self.sync_interval_secs == 0 {
			return invalid("intervals must be positive");
		}
		if self.peer_ttl_secs < self.announce_interval_secs {
			return invalid("peer TTL shorter than the announce interval");
		}
		if self.session_timeout_secs == 0 || self.dial_timeout_secs == 0 {
			return invalid("timeouts must be positive");
		}
		if self.max_frame_bytes == 0 || self.max_frame_bytes > crate::protocol::MAX_FRAME_BYTES {
			return invalid("maxFrameBytes out of range");
		}
		if self.want_batch_size == 0 {
			return invalid("wantBatchSize must be positive");
		}
		if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
			return invalid("listenAddr is not a socket address");
		}
		Ok(())
	}

	pub fn announce_interval(&self) -> Duration {
		Duration::from_secs(self.announce_interval_secs)
	}

	pub fn sync_interval(&self) -> Duration {
		Duration::from_secs(self.sync_interval_secs)
	}

	pub fn peer_ttl(&self) -> Duration {
		Duration::from_secs(self.peer_ttl_secs)
	}

	pub fn dial_timeout(&self) -> Duration {
		Duration::from_secs(self.dial_timeout_secs)
	}

	pub fn session_timeout(&self) -> Duration {
		Duration::from_secs(self.session_timeout_secs)
	}
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SyncError> {
	value.trim().parse().map_err(|_| SyncError::InvalidConfig {
		message: format!("{}{}={:?} is not valid", ENV_PREFIX, name, value),
	})
}


// vim: ts=4
