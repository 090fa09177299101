//! Team file storage: `<base>/teams/<teamId>/...`

use crate::error::SyncError;
use crate::exclusion::{PatternMatcher, STATE_DIR, TMP_SUFFIX};
use crate::logging::*;
use crate::manifest::{self, hash_file, Manifest};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Where an incoming file ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Landing {
	/// Written at its own path
	Written(PathBuf),
	/// Local content differed; written beside it instead
	Conflict(PathBuf),
}

impl Landing {
	pub fn path(&self) -> &Path {
		match self {
			Landing::Written(p) | Landing::Conflict(p) => p,
		}
	}
}

#[derive(Debug, Clone)]
pub struct TeamStore {
	base_dir: PathBuf,
	matcher: PatternMatcher,
}

impl TeamStore {
	pub fn new(base_dir: impl Into<PathBuf>, matcher: PatternMatcher) -> Self {
		TeamStore { base_dir: base_dir.into(), matcher }
	}

	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}

	pub fn team_dir(&self, team_id: &str) -> Result<PathBuf, SyncError> {
		// Team ids are opaque, but must stay a single path component
		if team_id.is_empty()
			|| team_id == "."
			|| team_id == ".."
			|| team_id.contains('/')
			|| team_id.contains('\\')
		{
			return Err(SyncError::InvalidPath { path: team_id.to_string() });
		}
		Ok(self.base_dir.join("teams").join(team_id))
	}

	/// Create the team directory and its hidden state directory
	pub fn ensure_team_dir(&self, team_id: &str) -> Result<PathBuf, SyncError> {
		let dir = self.team_dir(team_id)?;
		fs::create_dir_all(dir.join(STATE_DIR))?;
		Ok(dir)
	}

	/// Absolute path of a peer-supplied relative path inside a team directory
	pub fn file_path(&self, team_id: &str, rel: &str) -> Result<PathBuf, SyncError> {
		let clean = manifest::clean_rel_path(rel)?;
		let mut path = self.team_dir(team_id)?;
		for part in clean.split('/') {
			path.push(part);
		}
		Ok(path)
	}

	/// Build and persist the manifest of one team
	pub fn refresh_manifest(&self, team_id: &str) -> Result<Manifest, SyncError> {
		let dir = self.ensure_team_dir(team_id)?;
		let manifest = manifest::build_manifest(&dir, team_id, &self.matcher)?;
		manifest::write_manifest(&dir, &manifest)?;
		Ok(manifest)
	}

	pub fn read_file(&self, team_id: &str, rel: &str) -> Result<Vec<u8>, SyncError> {
		Ok(fs::read(self.file_path(team_id, rel)?)?)
	}

	/// Remove local files the remote manifest reports deleted.
	///
	/// A file is left alone when the local manifest does not list it as live,
	/// or when both sides know a hash and the hashes differ (the local copy
	/// changed since the remote last saw it). Returns the removed paths.
	pub fn apply_remote_deletions(&self, local: Option<&Manifest>, remote: &Manifest) -> Vec<String> {
		let Some(local) = local else {
			return Vec::new();
		};
		let local_files = local.by_path();

		let mut removed = Vec::new();
		for entry in remote.files.iter().filter(|e| e.deleted) {
			let Some(le) = local_files.get(entry.path.as_str()) else { continue };
			if le.deleted {
				continue;
			}
			if !entry.hash.is_empty() && !le.hash.is_empty() && entry.hash != le.hash {
				continue;
			}
			let Ok(path) = self.file_path(&remote.team_id, &entry.path) else { continue };
			match fs::remove_file(&path) {
				Ok(()) => {
					debug!("Removed {} (deleted on peer)", path.display());
					removed.push(entry.path.clone());
				}
				Err(e) => debug!("Failed to remove {}: {}", path.display(), e),
			}
		}
		removed
	}

	/// Land an incoming file.
	///
	/// If a file already exists at the path with content other than
	/// `declared_hash`, the data goes to
	/// `<path>.conflict-<sender>-<YYYYmmdd-HHMMSS>` and the local file is kept.
	/// A conflict copy from `sender` that already holds `declared_hash` is
	/// reused instead of writing another one. Paths the local matcher
	/// excludes are refused.
	pub fn write_incoming(
		&self,
		team_id: &str,
		rel: &str,
		declared_hash: &str,
		mod_time: i64,
		data: &[u8],
		sender: &str,
	) -> Result<Landing, SyncError> {
		let clean = manifest::clean_rel_path(rel)?;
		if self.matcher.is_excluded(Path::new(&clean)) {
			return Err(SyncError::InvalidPath { path: rel.to_string() });
		}
		let target = self.file_path(team_id, &clean)?;

		let conflict = target.is_file()
			&& !declared_hash.is_empty()
			&& hash_file(&target)? != declared_hash;

		let landing = if conflict {
			let sender = sanitize_component(sender);
			if let Some(existing) = find_conflict_copy(&target, &sender, declared_hash) {
				debug!("{} already holds this revision", existing.display());
				return Ok(Landing::Conflict(existing));
			}
			let suffix = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
			Landing::Conflict(free_conflict_name(&target, &sender, &suffix))
		} else {
			Landing::Written(target)
		};

		let path = landing.path();
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}

		let mut tmp = path.to_path_buf().into_os_string();
		tmp.push(TMP_SUFFIX);
		let tmp = PathBuf::from(tmp);
		fs::write(&tmp, data)?;
		if mod_time > 0 {
			let ft = FileTime::from_unix_time(mod_time, 0);
			filetime::set_file_times(&tmp, ft, ft)?;
		}
		if let Err(e) = fs::rename(&tmp, path) {
			let _ = fs::remove_file(&tmp);
			return Err(e.into());
		}

		Ok(landing)
	}
}

/// Sibling `<target>.conflict-<sender>-*` whose content hashes to `hash`
fn find_conflict_copy(target: &Path, sender: &str, hash: &str) -> Option<PathBuf> {
	let dir = target.parent()?;
	let prefix = format!("{}.conflict-{}-", target.file_name()?.to_string_lossy(), sender);
	let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
		.ok()?
		.filter_map(|e| e.ok())
		.filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
		.map(|e| e.path())
		.filter(|p| p.is_file())
		.collect();
	candidates.sort();
	candidates.into_iter().find(|p| hash_file(p).map(|h| h == hash).unwrap_or(false))
}

/// `<target>.conflict-<sender>-<suffix>`, numbered when that name is taken
fn free_conflict_name(target: &Path, sender: &str, suffix: &str) -> PathBuf {
	let base = format!(".conflict-{}-{}", sender, suffix);
	let mut n = 0u32;
	loop {
		let mut name = target.as_os_str().to_os_string();
		name.push(&base);
		if n > 0 {
			name.push(format!("-{}", n));
		}
		let path = PathBuf::from(name);
		if !path.exists() {
			return path;
		}
		n += 1;
	}
}

/// Keep a peer-supplied device id from introducing path separators
fn sanitize_component(s: &str) -> String {
	s.chars().map(|c| if c == '/' || c == '\\' { '_' } else { c }).collect()
}


// vim: ts=4
