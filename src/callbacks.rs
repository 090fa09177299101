//! Callback traits for merge and file events
//!
//! Callbacks run on the sync task that produced the event. Implementations
//! that touch UI state should hand the event off (e.g. to a channel) rather
//! than block.

use crate::error::SyncError;
use crate::model::AppConfig;
use std::path::Path;

// Type aliases to reduce complexity
type MergedFn = dyn Fn(&AppConfig) + Send + Sync;
type FileReceivedFn = dyn Fn(&str, &str, &Path) + Send + Sync;
type FileConflictFn = dyn Fn(&str, &str, &Path) + Send + Sync;
type FileDeletedFn = dyn Fn(&str, &str) + Send + Sync;
type ErrorFn = dyn Fn(&str, &SyncError) + Send + Sync;

/// Combined callback handler for all events
pub trait SyncCallbacks: Send + Sync {
	/// A sync session changed the local document; `doc` is the new document
	fn on_merged(&self, _doc: &AppConfig) {}

	/// A file from a peer was written at its own path
	fn on_file_received(&self, _team_id: &str, _path: &str, _written: &Path) {}

	/// A file from a peer clashed with local content and was written beside it
	fn on_file_conflict(&self, _team_id: &str, _path: &str, _conflict: &Path) {}

	/// A local file was removed because a peer deleted it
	fn on_file_deleted(&self, _team_id: &str, _path: &str) {}

	/// A sync session with `peer` failed
	fn on_error(&self, _peer: &str, _error: &SyncError) {}
}

/// Default callback implementation that does nothing
pub struct NoCallbacks;

impl SyncCallbacks for NoCallbacks {}

/// Builder for callbacks using function closures
#[derive(Default)]
pub struct CallbackBuilder {
	merged: Option<Box<MergedFn>>,
	file_received: Option<Box<FileReceivedFn>>,
	file_conflict: Option<Box<FileConflictFn>>,
	file_deleted: Option<Box<FileDeletedFn>>,
	error: Option<Box<ErrorFn>>,
}

impl CallbackBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set merged-document callback
	pub fn on_merged<F>(mut self, callback: F) -> Self
	where
		F: Fn(&AppConfig) + Send + Sync + 'static,
	{
		self.merged = Some(Box::new(callback));
		self
	}

	/// Set received-file callback
	pub fn on_file_received<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str, &str, &Path) + Send + Sync + 'static,
	{
		self.file_received = Some(Box::new(callback));
		self
	}

	/// Set conflict-file callback
	pub fn on_file_conflict<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str, &str, &Path) + Send + Sync + 'static,
	{
		self.file_conflict = Some(Box::new(callback));
		self
	}

	/// Set deleted-file callback
	pub fn on_file_deleted<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str, &str) + Send + Sync + 'static,
	{
		self.file_deleted = Some(Box::new(callback));
		self
	}

	/// Set session error callback
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str, &SyncError) + Send + Sync + 'static,
	{
		self.error = Some(Box::new(callback));
		self
	}

	/// Build the callbacks handler
	pub fn build(self) -> Box<dyn SyncCallbacks> {
		Box::new(CompositeCallbacks {
			merged: self.merged,
			file_received: self.file_received,
			file_conflict: self.file_conflict,
			file_deleted: self.file_deleted,
			error: self.error,
		})
	}
}

/// Internal composite callbacks implementation
struct CompositeCallbacks {
	merged: Option<Box<MergedFn>>,
	file_received: Option<Box<FileReceivedFn>>,
	file_conflict: Option<Box<FileConflictFn>>,
	file_deleted: Option<Box<FileDeletedFn>>,
	error: Option<Box<ErrorFn>>,
}

impl SyncCallbacks for CompositeCallbacks {
	fn on_merged(&self, doc: &AppConfig) {
		if let Some(ref callback) = self.merged {
			callback(doc);
		}
	}

	fn on_file_received(&self, team_id: &str, path: &str, written: &Path) {
		if let Some(ref callback) = self.file_received {
			callback(team_id, path, written);
		}
	}

	fn on_file_conflict(&self, team_id: &str, path: &str, conflict: &Path) {
		if let Some(ref callback) = self.file_conflict {
			callback(team_id, path, conflict);
		}
	}

	fn on_file_deleted(&self, team_id: &str, path: &str) {
		if let Some(ref callback) = self.file_deleted {
			callback(team_id, path);
		}
	}

	fn on_error(&self, peer: &str, error: &SyncError) {
		if let Some(ref callback) = self.error {
			callback(peer, error);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[test]
	fn test_builder_routes_events() {
		let merged = Arc::new(AtomicUsize::new(0));
		let conflicts = Arc::new(AtomicUsize::new(0));
		let (m, c) = (merged.clone(), conflicts.clone());

		let callbacks = CallbackBuilder::new()
			.on_merged(move |_| {
				m.fetch_add(1, Ordering::SeqCst);
			})
			.on_file_conflict(move |team, path, _| {
				assert_eq!((team, path), ("t1", "a.txt"));
				c.fetch_add(1, Ordering::SeqCst);
			})
			.build();

		callbacks.on_merged(&AppConfig::default());
		callbacks.on_file_conflict("t1", "a.txt", Path::new("/tmp/a.txt.conflict"));
		callbacks.on_file_received("t1", "b.txt", Path::new("/tmp/b.txt"));

		assert_eq!(merged.load(Ordering::SeqCst), 1);
		assert_eq!(conflicts.load(Ordering::SeqCst), 1);
	}
}

// vim: ts=4
