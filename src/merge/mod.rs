//! Version-vector merge of configuration documents
//!
//! Two entry points:
//! - [`apply_local_edits`] stamps a locally edited document against its
//!   previous revision (bumping vectors only for entities that changed).
//! - [`merge_remote`] folds a peer's team-scoped document into the local one.
//!
//! Both are pure: no I/O, no clocks other than the `now` passed in.

mod alloc;
mod local;
mod remote;
mod teams;

pub use alloc::IdAllocator;
pub use local::{apply_local_edits, apply_local_edits_at};
pub use remote::merge_remote;
pub use teams::{merge_members, merge_requests, normalize_members, pick_join_request};

pub(crate) use local::normalize_host_scope;
pub(crate) use teams::normalize_requests;

use crate::model::{Host, Network, SyncMeta, Team, TeamScript};
use crate::version::{compare_version, VersionOrder};

/// Suffix appended to the name of a conflict clone
pub const CONFLICT_SUFFIX: &str = " (conflict)";

/// An entity that replicates between peers
pub trait Replicated: Clone {
	/// Cross-peer identity (`uid` or opaque `id`)
	fn key(&self) -> &str;
	fn set_key(&mut self, key: String);
	fn meta(&self) -> &SyncMeta;
	fn meta_mut(&mut self) -> &mut SyncMeta;
	fn name(&self) -> &str;
	fn set_name(&mut self, name: String);
	/// Observable fields equal, ignoring replication metadata, numeric ids
	/// and nested collections that replicate on their own
	fn same_content(&self, other: &Self) -> bool;
}

pub(crate) fn compare_meta(local: &SyncMeta, remote: &SyncMeta) -> VersionOrder {
	compare_version(&local.version, &remote.version, local.updated_at, remote.updated_at)
}

/// Who and when for a local edit
#[derive(Debug, Clone)]
pub struct Stamp {
	pub device_id: String,
	pub actor: String,
	pub now: i64,
}

pub(crate) fn conflict_name(name: &str) -> String {
	let base = name.trim();
	let base = if base.is_empty() { "item" } else { base };
	format!("{}{}", base, CONFLICT_SUFFIX)
}

/// Identity of the clone made when `key` meets a concurrent remote revision.
///
/// Derived from the key and the remote vector so that seeing the same remote
/// revision again finds the existing clone instead of making another.
pub(crate) fn conflict_key(key: &str, remote: &SyncMeta) -> String {
	let mut hasher = blake3::Hasher::new();
	hasher.update(key.as_bytes());
	for (device, counter) in &remote.version {
		hasher.update(b"|");
		hasher.update(device.as_bytes());
		hasher.update(b"=");
		hasher.update(counter.to_string().as_bytes());
	}
	hasher.update(b"|");
	hasher.update(remote.updated_at.to_string().as_bytes());

	let digest = hasher.finalize();
	let mut bytes = [0u8; 16];
	bytes.copy_from_slice(&digest.as_bytes()[..16]);
	uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

impl Replicated for Team {
	fn key(&self) -> &str {
		&self.id
	}
	fn set_key(&mut self, key: String) {
		self.id = key;
	}
	fn meta(&self) -> &SyncMeta {
		&self.sync
	}
	fn meta_mut(&mut self) -> &mut SyncMeta {
		&mut self.sync
	}
	fn name(&self) -> &str {
		&self.name
	}
	fn set_name(&mut self, name: String) {
		self.name = name;
	}
	fn same_content(&self, other: &Self) -> bool {
		teams::team_same_content(self, other)
	}
}

impl Replicated for TeamScript {
	fn key(&self) -> &str {
		&self.id
	}
	fn set_key(&mut self, key: String) {
		self.id = key;
	}
	fn meta(&self) -> &SyncMeta {
		&self.sync
	}
	fn meta_mut(&mut self) -> &mut SyncMeta {
		&mut self.sync
	}
	fn name(&self) -> &str {
		&self.name
	}
	fn set_name(&mut self, name: String) {
		self.name = name;
	}
	fn same_content(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.command == other.command
			&& self.description == other.description
			&& self.scope == other.scope
			&& self.team_id == other.team_id
	}
}

impl Replicated for Network {
	fn key(&self) -> &str {
		&self.uid
	}
	fn set_key(&mut self, key: String) {
		self.uid = key;
	}
	fn meta(&self) -> &SyncMeta {
		&self.sync
	}
	fn meta_mut(&mut self) -> &mut SyncMeta {
		&mut self.sync
	}
	fn name(&self) -> &str {
		&self.name
	}
	fn set_name(&mut self, name: String) {
		self.name = name;
	}
	fn same_content(&self, other: &Self) -> bool {
		self.name == other.name && self.team_id == other.team_id
	}
}

impl Replicated for Host {
	fn key(&self) -> &str {
		&self.uid
	}
	fn set_key(&mut self, key: String) {
		self.uid = key;
	}
	fn meta(&self) -> &SyncMeta {
		&self.sync
	}
	fn meta_mut(&mut self) -> &mut SyncMeta {
		&mut self.sync
	}
	fn name(&self) -> &str {
		&self.name
	}
	fn set_name(&mut self, name: String) {
		self.name = name;
	}
	fn same_content(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.host == other.host
			&& self.port == other.port
			&& self.user == other.user
			&& self.driver == other.driver
			&& self.auth == other.auth
			&& self.host_key == other.host_key
			&& self.scope == other.scope
			&& self.team_id == other.team_id
			&& self.telecom == other.telecom
			&& self.sftp == other.sftp
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_conflict_name() {
		assert_eq!(conflict_name("db01"), "db01 (conflict)");
		assert_eq!(conflict_name("  "), "item (conflict)");
	}

	#[test]
	fn test_conflict_key_is_stable_per_revision() {
		let mut meta = SyncMeta::default();
		meta.version.insert("B".into(), 1);
		let first = conflict_key("host-1", &meta);
		assert_eq!(first, conflict_key("host-1", &meta));
		assert_ne!(first, conflict_key("host-2", &meta));

		meta.version.insert("B".into(), 2);
		assert_ne!(first, conflict_key("host-1", &meta));
	}
}

// vim: ts=4
