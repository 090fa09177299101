//! Per-team file manifests and the want-list diff
//!
//! A manifest lists every regular file under a team directory with its
//! size, modification time (unix seconds) and blake3 content hash. Files
//! that disappeared since the previous manifest stay listed as tombstones so
//! the deletion replicates.

use crate::error::SyncError;
use crate::exclusion::{PatternMatcher, STATE_DIR};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const MANIFEST_FILE: &str = "manifest.json";

fn is_zero_i64(v: &i64) -> bool {
	*v == 0
}

fn is_zero_u64(v: &u64) -> bool {
	*v == 0
}

fn is_false(v: &bool) -> bool {
	!*v
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileEntry {
	pub path: String,
	#[serde(skip_serializing_if = "is_zero_u64")]
	pub size: u64,
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub mod_time: i64,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub hash: String,
	#[serde(skip_serializing_if = "is_false")]
	pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Manifest {
	pub team_id: String,
	pub generated_at: i64,
	pub files: Vec<FileEntry>,
}

impl Manifest {
	/// Entries keyed by path
	pub fn by_path(&self) -> HashMap<&str, &FileEntry> {
		self.files.iter().map(|f| (f.path.as_str(), f)).collect()
	}

	pub fn get(&self, path: &str) -> Option<&FileEntry> {
		self.files.iter().find(|f| f.path == path)
	}
}

pub fn manifest_path(team_dir: &Path) -> PathBuf {
	team_dir.join(STATE_DIR).join(MANIFEST_FILE)
}

/// Previously written manifest of a team directory
pub fn load_manifest(team_dir: &Path) -> Result<Manifest, SyncError> {
	let data = fs::read(manifest_path(team_dir))?;
	serde_json::from_slice(&data).map_err(|e| SyncError::Other { message: e.to_string() })
}

pub fn write_manifest(team_dir: &Path, manifest: &Manifest) -> Result<(), SyncError> {
	let path = manifest_path(team_dir);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let data = serde_json::to_vec_pretty(manifest)
		.map_err(|e| SyncError::Other { message: e.to_string() })?;
	crate::document::write_atomic(&path, &data)?;
	Ok(())
}

/// blake3 of a file's content, hex encoded
pub fn hash_file(path: &Path) -> io::Result<String> {
	let mut file = fs::File::open(path)?;
	let mut hasher = blake3::Hasher::new();
	io::copy(&mut file, &mut hasher)?;
	Ok(hasher.finalize().to_hex().to_string())
}

pub fn hash_bytes(data: &[u8]) -> String {
	blake3::hash(data).to_hex().to_string()
}

fn mod_time_secs(meta: &fs::Metadata) -> i64 {
	meta.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

/// Slash-separated path of `path` relative to `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
	let rel = path.strip_prefix(root).ok()?;
	let parts: Vec<String> =
		rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
	if parts.is_empty() {
		return None;
	}
	Some(parts.join("/"))
}

/// Walk `team_dir` and build its manifest against the previously written one
pub fn build_manifest(
	team_dir: &Path,
	team_id: &str,
	matcher: &PatternMatcher,
) -> Result<Manifest, SyncError> {
	build_manifest_at(team_dir, team_id, matcher, chrono::Utc::now().timestamp())
}

/// [`build_manifest`] with an explicit clock for tombstone timestamps
pub fn build_manifest_at(
	team_dir: &Path,
	team_id: &str,
	matcher: &PatternMatcher,
	now: i64,
) -> Result<Manifest, SyncError> {
	if !team_dir.is_dir() {
		return Err(SyncError::InvalidPath { path: team_dir.display().to_string() });
	}
	let previous = load_manifest(team_dir).unwrap_or_default();

	let mut entries: BTreeMap<String, FileEntry> = BTreeMap::new();
	let walker = ignore::WalkBuilder::new(team_dir)
		.standard_filters(false)
		.follow_links(false)
		.build();
	for dent in walker {
		// Unreadable entries are skipped, the next build picks them up
		let Ok(dent) = dent else { continue };
		if !dent.file_type().map(|t| t.is_file()).unwrap_or(false) {
			continue;
		}
		let Some(rel) = relative_path(team_dir, dent.path()) else { continue };
		if matcher.is_excluded(Path::new(&rel)) {
			continue;
		}
		let Ok(meta) = dent.metadata() else { continue };
		let Ok(hash) = hash_file(dent.path()) else { continue };
		entries.insert(
			rel.clone(),
			FileEntry {
				path: rel,
				size: meta.len(),
				mod_time: mod_time_secs(&meta),
				hash,
				deleted: false,
			},
		);
	}

	for prev in previous.files {
		if entries.contains_key(&prev.path) {
			continue;
		}
		let entry = if prev.deleted {
			prev
		} else {
			FileEntry { mod_time: now, deleted: true, ..prev }
		};
		entries.insert(entry.path.clone(), entry);
	}

	Ok(Manifest {
		team_id: team_id.to_string(),
		generated_at: now,
		files: entries.into_values().collect(),
	})
}

/// Validate a peer-supplied relative path and return its cleaned form
pub fn clean_rel_path(rel: &str) -> Result<String, SyncError> {
	let invalid = || SyncError::InvalidPath { path: rel.to_string() };

	let trimmed = rel.trim();
	if trimmed.is_empty() || trimmed.contains('\\') || trimmed.starts_with('/') {
		return Err(invalid());
	}
	let mut parts: Vec<&str> = Vec::new();
	for part in trimmed.split('/') {
		match part {
			"" | "." => {}
			".." => {
				if parts.pop().is_none() {
					return Err(invalid());
				}
			}
			other => parts.push(other),
		}
	}
	if parts.is_empty() {
		return Err(invalid());
	}
	Ok(parts.join("/"))
}

/// Paths of `remote` that the local side should request.
///
/// A path is wanted when it is live remotely and either missing locally,
/// tombstoned locally with an older modification time, or differing in
/// content with the remote strictly newer. On an exact modification-time
/// tie the greater hash wins so both peers pick the same direction.
pub fn compute_wants(local: Option<&Manifest>, remote: &Manifest) -> Vec<String> {
	let local_files = local.map(|m| m.by_path()).unwrap_or_default();

	let mut wants = Vec::new();
	for entry in &remote.files {
		if entry.deleted || clean_rel_path(&entry.path).is_err() {
			continue;
		}
		let Some(le) = local_files.get(entry.path.as_str()) else {
			wants.push(entry.path.clone());
			continue;
		};
		if le.deleted {
			if le.mod_time < entry.mod_time {
				wants.push(entry.path.clone());
			}
			continue;
		}
		if le.hash == entry.hash {
			continue;
		}
		if entry.mod_time > le.mod_time
			|| (entry.mod_time == le.mod_time && entry.hash > le.hash)
		{
			wants.push(entry.path.clone());
		}
	}
	wants
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(path: &str, hash: &str, mod_time: i64) -> FileEntry {
		FileEntry { path: path.into(), hash: hash.into(), mod_time, size: 1, deleted: false }
	}

	fn manifest(files: Vec<FileEntry>) -> Manifest {
		Manifest { team_id: "t1".into(), generated_at: 0, files }
	}

	#[test]
	fn test_clean_rel_path() {
		assert_eq!(clean_rel_path("a/./b//c").unwrap(), "a/b/c");
		assert_eq!(clean_rel_path("a/../b").unwrap(), "b");
		assert!(clean_rel_path("").is_err());
		assert!(clean_rel_path("  ").is_err());
		assert!(clean_rel_path("/etc/passwd").is_err());
		assert!(clean_rel_path("../x").is_err());
		assert!(clean_rel_path("a/../../x").is_err());
		assert!(clean_rel_path("a\\b").is_err());
		assert!(clean_rel_path(".").is_err());
	}

	#[test]
	fn test_wants_missing_and_newer() {
		let local = manifest(vec![entry("same", "h1", 10), entry("old", "h1", 10)]);
		let remote = manifest(vec![
			entry("same", "h1", 99),
			entry("old", "h2", 20),
			entry("new", "h3", 5),
		]);
		assert_eq!(compute_wants(Some(&local), &remote), vec!["old", "new"]);
		assert_eq!(compute_wants(None, &remote).len(), 3);
	}

	#[test]
	fn test_wants_empty_for_identical() {
		let m = manifest(vec![entry("a", "h1", 10), entry("b", "h2", 11)]);
		assert!(compute_wants(Some(&m), &m).is_empty());
	}

	#[test]
	fn test_tie_break_is_one_directional() {
		let a = manifest(vec![entry("f", "aaaa", 10)]);
		let b = manifest(vec![entry("f", "bbbb", 10)]);
		assert_eq!(compute_wants(Some(&a), &b), vec!["f"]);
		assert!(compute_wants(Some(&b), &a).is_empty());
	}

	#[test]
	fn test_tombstones() {
		let mut gone = entry("f", "h1", 10);
		gone.deleted = true;

		// Remote tombstones are never wanted
		let live = manifest(vec![entry("f", "h1", 5)]);
		assert!(compute_wants(Some(&live), &manifest(vec![gone.clone()])).is_empty());

		// Local tombstone loses to a newer remote copy only
		let local = manifest(vec![gone]);
		assert!(compute_wants(Some(&local), &manifest(vec![entry("f", "h2", 10)])).is_empty());
		assert_eq!(compute_wants(Some(&local), &manifest(vec![entry("f", "h2", 11)])), vec!["f"]);
	}

	#[test]
	fn test_unsafe_remote_paths_ignored() {
		let remote = manifest(vec![entry("../escape", "h", 1), entry("/abs", "h", 1)]);
		assert!(compute_wants(None, &remote).is_empty());
	}
}

// vim: ts=4
