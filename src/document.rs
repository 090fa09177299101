//! On-disk configuration document

use crate::error::DocumentError;
use crate::logging::*;
use crate::model::normalize::normalize;
use crate::model::{new_id, AppConfig, UserProfile, DOCUMENT_VERSION};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Fresh document with a new device identity
pub fn default_document() -> AppConfig {
	AppConfig {
		version: DOCUMENT_VERSION,
		user: UserProfile { device_id: new_id(), ..Default::default() },
		..Default::default()
	}
}

/// Write `data` to `path` through a synced temporary sibling and a rename
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
	let mut tmp = path.to_path_buf().into_os_string();
	tmp.push(".tmp");
	let tmp = std::path::PathBuf::from(tmp);

	let result = (|| {
		let mut file = fs::File::create(&tmp)?;
		file.write_all(data)?;
		file.sync_all()?;
		fs::rename(&tmp, path)
	})();
	if result.is_err() {
		let _ = fs::remove_file(&tmp);
	}
	result
}

/// Parse, migrate and normalize a document.
///
/// Returns the document and whether it differs from what was read (the
/// caller should save it back).
pub fn parse(data: &[u8]) -> Result<(AppConfig, bool), DocumentError> {
	let mut doc: AppConfig = serde_json::from_slice(data)?;

	let mut changed = false;
	if doc.version == 0 || doc.version == 1 {
		debug!("Migrating document version {} -> {}", doc.version, DOCUMENT_VERSION);
		doc.version = DOCUMENT_VERSION;
		changed = true;
	}
	if doc.version != DOCUMENT_VERSION {
		return Err(DocumentError::UnsupportedVersion {
			found: doc.version,
			expected: DOCUMENT_VERSION,
		});
	}

	if normalize(&mut doc) {
		changed = true;
	}
	Ok((doc, changed))
}

pub fn load(path: &Path) -> Result<(AppConfig, bool), DocumentError> {
	let data = fs::read(path)?;
	parse(&data)
}

/// Load `path`, creating it with a default document when missing, and save
/// back any migration or normalization.
pub fn load_or_create(path: &Path) -> Result<AppConfig, DocumentError> {
	if !path.exists() {
		let doc = default_document();
		save(path, &doc)?;
		info!("Created new document at {}", path.display());
		return Ok(doc);
	}
	let (doc, changed) = load(path)?;
	if changed {
		save(path, &doc)?;
	}
	Ok(doc)
}

pub fn save(path: &Path, doc: &AppConfig) -> Result<(), DocumentError> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			fs::create_dir_all(parent)?;
		}
	}
	let data = serde_json::to_vec_pretty(doc)?;
	write_atomic(path, &data)?;
	Ok(())
}


// vim: ts=4
