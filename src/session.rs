//! One sync session between two peers
//!
//! Both ends run the same code over any byte stream:
//!
//! 1. exchange `sync` messages (team-scoped document plus team manifests)
//! 2. merge the remote document into the local one
//! 3. apply remote deletions, send want batches and `want_done`
//! 4. serve the peer's wants while landing the files it sends, until both
//!    `file_done` sentinels have crossed
//!
//! Step 4 reads and writes concurrently so neither side can block waiting
//! for the other to finish sending.

use crate::callbacks::{NoCallbacks, SyncCallbacks};
use crate::config::Config;
use crate::error::SyncError;
use crate::logging::*;
use crate::manifest::{compute_wants, FileEntry, Manifest};
use crate::merge::merge_remote;
use crate::model::AppConfig;
use crate::protocol::{
	framed, FilePayload, FrameReader, FrameWriter, ProtocolError, SharedSecret, SyncPayload,
	TeamSummary, WantPayload, WireMessage,
};
use crate::store::{Landing, TeamStore};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Limits applied to every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
	pub max_frame_bytes: usize,
	pub want_batch_size: usize,
	pub session_timeout: Duration,
}

impl SessionSettings {
	pub fn from_config(config: &Config) -> Self {
		SessionSettings {
			max_frame_bytes: config.max_frame_bytes,
			want_batch_size: config.want_batch_size.max(1),
			session_timeout: config.session_timeout(),
		}
	}
}

impl Default for SessionSettings {
	fn default() -> Self {
		Self::from_config(&Config::default())
	}
}

/// What one session did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
	/// Device id the peer announced
	pub peer: String,
	/// The local document changed
	pub merged: bool,
	/// Paths requested from the peer
	pub wanted: usize,
	/// Files sent to the peer
	pub served: usize,
	/// Files landed at their own path
	pub received: usize,
	/// Files landed as conflict copies
	pub conflicts: usize,
	/// Local files removed because the peer deleted them
	pub deleted: usize,
}

#[derive(Default)]
struct Landed {
	received: usize,
	conflicts: usize,
}

/// Local state shared by all sessions: the working document, team file
/// storage and the optional shared secret.
pub struct SyncEngine {
	document: Mutex<AppConfig>,
	store: TeamStore,
	secret: Option<SharedSecret>,
	settings: SessionSettings,
	callbacks: RwLock<Arc<dyn SyncCallbacks>>,
}

impl SyncEngine {
	pub fn new(
		document: AppConfig,
		store: TeamStore,
		secret: Option<SharedSecret>,
		settings: SessionSettings,
	) -> Self {
		SyncEngine {
			document: Mutex::new(document),
			store,
			secret,
			settings,
			callbacks: RwLock::new(Arc::new(NoCallbacks)),
		}
	}

	fn lock_document(&self) -> MutexGuard<'_, AppConfig> {
		self.document.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Snapshot of the working document
	pub fn document(&self) -> AppConfig {
		self.lock_document().clone()
	}

	/// Replace the working document
	pub fn set_document(&self, doc: AppConfig) {
		*self.lock_document() = doc;
	}

	pub fn device_id(&self) -> String {
		self.lock_document().user.device_id.clone()
	}

	pub fn store(&self) -> &TeamStore {
		&self.store
	}

	pub fn secret(&self) -> Option<&SharedSecret> {
		self.secret.as_ref()
	}

	pub fn set_callbacks(&self, callbacks: Arc<dyn SyncCallbacks>) {
		*self.callbacks.write().unwrap_or_else(PoisonError::into_inner) = callbacks;
	}

	fn callbacks(&self) -> Arc<dyn SyncCallbacks> {
		self.callbacks.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// Report a failed session with `peer` to the registered callbacks
	pub fn notify_error(&self, peer: &str, error: &SyncError) {
		self.callbacks().on_error(peer, error);
	}

	/// Rebuild and persist the manifest of every active team of `doc`.
	///
	/// A team whose directory cannot be scanned is left out.
	pub async fn build_manifests(&self, doc: &AppConfig) -> Vec<Manifest> {
		let store = self.store.clone();
		let teams: Vec<String> = doc.active_team_ids().into_iter().map(String::from).collect();
		let built = blocking(move || {
			let mut manifests = Vec::with_capacity(teams.len());
			for team_id in &teams {
				match store.refresh_manifest(team_id) {
					Ok(m) => manifests.push(m),
					Err(e) => debug!("Skipping manifest of team {}: {}", team_id, e),
				}
			}
			Ok(manifests)
		})
		.await;
		built.unwrap_or_else(|e| {
			warn!("Manifest build failed: {}", e);
			Vec::new()
		})
	}

	/// Merge a peer's document into the working document.
	///
	/// Returns the new document when anything changed. Only the team-scoped
	/// part of `remote` is considered; a zero document version means the peer
	/// sent no document at all.
	pub fn apply_remote(&self, remote: &AppConfig) -> Option<AppConfig> {
		if remote.version == 0 {
			return None;
		}
		let scoped = remote.team_scoped();
		let mut doc = self.lock_document();
		let (merged, changed) = merge_remote(&doc, &scoped);
		if !changed {
			return None;
		}
		*doc = merged.clone();
		Some(merged)
	}

	/// Run one session over `stream`, bounded by the session timeout
	pub async fn sync_stream<S>(&self, stream: S) -> Result<SessionReport, SyncError>
	where
		S: AsyncRead + AsyncWrite,
	{
		match tokio::time::timeout(self.settings.session_timeout, self.run(stream)).await {
			Ok(result) => result,
			Err(_) => Err(ProtocolError::Timeout.into()),
		}
	}

	async fn run<S>(&self, stream: S) -> Result<SessionReport, SyncError>
	where
		S: AsyncRead + AsyncWrite,
	{
		let (reader, writer) = tokio::io::split(stream);
		let (mut reader, mut writer) =
			framed(reader, writer, self.secret.as_ref(), self.settings.max_frame_bytes);
		let callbacks = self.callbacks();

		let doc = self.document();
		let manifests = self.build_manifests(&doc).await;
		let local = WireMessage::Sync(SyncPayload {
			device_id: doc.user.device_id.clone(),
			user: doc.user.clone(),
			config: doc.team_scoped(),
			teams: TeamSummary::of(&doc),
			manifests: manifests.clone(),
		});

		// Both sides open with `sync`
		let (sent, received) = tokio::join!(writer.encode(&local), reader.decode::<WireMessage>());
		sent?;
		let remote = match received? {
			WireMessage::Sync(payload) => payload,
			other => {
				return Err(ProtocolError::ProtocolViolation(format!(
					"expected sync, got {}",
					other.kind()
				))
				.into())
			}
		};
		if remote.device_id.is_empty() {
			return Err(ProtocolError::ProtocolViolation("sync without device id".into()).into());
		}

		let mut report = SessionReport { peer: remote.device_id.clone(), ..Default::default() };
		if let Some(merged) = self.apply_remote(&remote.config) {
			info!("Merged document changes from {}", remote.device_id);
			report.merged = true;
			callbacks.on_merged(&merged);
		}

		self.exchange_files(reader, writer, manifests, remote, callbacks.as_ref(), &mut report)
			.await?;
		Ok(report)
	}

	async fn exchange_files<R, W>(
		&self,
		reader: FrameReader<R>,
		writer: FrameWriter<W>,
		manifests: Vec<Manifest>,
		remote: SyncPayload,
		callbacks: &dyn SyncCallbacks,
		report: &mut SessionReport,
	) -> Result<(), SyncError>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let local: HashMap<String, Manifest> =
			manifests.into_iter().map(|m| (m.team_id.clone(), m)).collect();
		let active: HashSet<String> =
			self.document().active_team_ids().into_iter().map(String::from).collect();
		let remote_manifests: Vec<Manifest> =
			remote.manifests.into_iter().filter(|m| active.contains(&m.team_id)).collect();

		// Deletions first, against the manifests exchanged above
		let store = self.store.clone();
		let (local_copy, remote_copy) = (local.clone(), remote_manifests.clone());
		let deleted = blocking(move || {
			let mut removed = Vec::new();
			for rm in &remote_copy {
				for path in store.apply_remote_deletions(local_copy.get(&rm.team_id), rm) {
					removed.push((rm.team_id.clone(), path));
				}
			}
			Ok(removed)
		})
		.await?;
		for (team_id, path) in &deleted {
			callbacks.on_file_deleted(team_id, path);
		}
		report.deleted = deleted.len();

		let mut wants = Vec::new();
		let mut requested: HashSet<(String, String)> = HashSet::new();
		for rm in &remote_manifests {
			let paths = compute_wants(local.get(&rm.team_id), rm);
			report.wanted += paths.len();
			requested.extend(paths.iter().map(|p| (rm.team_id.clone(), p.clone())));
			for batch in paths.chunks(self.settings.want_batch_size) {
				wants.push(WantPayload { team_id: rm.team_id.clone(), paths: batch.to_vec() });
			}
		}
		if report.wanted > 0 {
			debug!("Requesting {} files from {}", report.wanted, remote.device_id);
		}

		let (want_tx, want_rx) = unbounded_channel();
		let (landed, served) = tokio::try_join!(
			self.dispatch(reader, want_tx, &requested, &remote.device_id, callbacks),
			self.serve(writer, wants, want_rx, &local),
		)?;
		report.received = landed.received;
		report.conflicts = landed.conflicts;
		report.served = served;
		Ok(())
	}

	/// Read the peer's messages until `file_done`: queue its wants, land its files
	async fn dispatch<R>(
		&self,
		mut reader: FrameReader<R>,
		want_tx: UnboundedSender<(String, String)>,
		requested: &HashSet<(String, String)>,
		sender: &str,
		callbacks: &dyn SyncCallbacks,
	) -> Result<Landed, SyncError>
	where
		R: AsyncRead + Unpin,
	{
		let mut want_tx = Some(want_tx);
		let mut landed = Landed::default();

		loop {
			match reader.decode::<WireMessage>().await? {
				WireMessage::Want(want) => {
					let Some(tx) = &want_tx else {
						debug!("Ignoring want after want_done from {}", sender);
						continue;
					};
					if want.team_id.is_empty() {
						continue;
					}
					for path in want.paths.into_iter().filter(|p| !p.is_empty()) {
						// The receiver only goes away once serving is over
						let _ = tx.send((want.team_id.clone(), path));
					}
				}
				WireMessage::WantDone => want_tx = None,
				WireMessage::File(file) => {
					let (team_id, path) = (file.team_id.clone(), file.path.clone());
					match self.land_file(file, requested, sender).await {
						Ok(Landing::Written(written)) => {
							landed.received += 1;
							callbacks.on_file_received(&team_id, &path, &written);
						}
						Ok(Landing::Conflict(copy)) => {
							warn!("Conflicting {} from {} saved as {}", path, sender, copy.display());
							landed.conflicts += 1;
							callbacks.on_file_conflict(&team_id, &path, &copy);
						}
						Err(e) => warn!("Dropping file {}/{} from {}: {}", team_id, path, sender, e),
					}
				}
				WireMessage::FileDone => return Ok(landed),
				WireMessage::Sync(_) => {
					return Err(ProtocolError::ProtocolViolation("second sync message".into()).into())
				}
			}
		}
	}

	async fn land_file(
		&self,
		file: FilePayload,
		requested: &HashSet<(String, String)>,
		sender: &str,
	) -> Result<Landing, SyncError> {
		// Land only paths this side requested
		if !requested.contains(&(file.team_id.clone(), file.path.clone())) {
			return Err(SyncError::Other { message: "file was not requested".to_string() });
		}
		let data = STANDARD.decode(file.data_b64.as_bytes()).map_err(ProtocolError::from)?;
		let store = self.store.clone();
		let sender = sender.to_string();
		blocking(move || {
			store.write_incoming(&file.team_id, &file.path, &file.hash, file.mod_time, &data, &sender)
		})
		.await
	}

	/// Send our wants, then answer the peer's wants until it sent `want_done`
	async fn serve<W>(
		&self,
		mut writer: FrameWriter<W>,
		wants: Vec<WantPayload>,
		mut want_rx: UnboundedReceiver<(String, String)>,
		local: &HashMap<String, Manifest>,
	) -> Result<usize, SyncError>
	where
		W: AsyncWrite + Unpin,
	{
		for want in wants {
			writer.encode(&WireMessage::Want(want)).await?;
		}
		writer.encode(&WireMessage::WantDone).await?;

		let index: HashMap<&str, HashMap<&str, &FileEntry>> =
			local.iter().map(|(team_id, m)| (team_id.as_str(), m.by_path())).collect();

		let mut served = 0;
		while let Some((team_id, path)) = want_rx.recv().await {
			let Some(entry) = index.get(team_id.as_str()).and_then(|m| m.get(path.as_str())).copied() else {
				continue;
			};
			if entry.deleted {
				continue;
			}
			let data = match self.store.file_path(&team_id, &path) {
				Ok(full) => match tokio::fs::read(&full).await {
					Ok(data) => data,
					Err(e) => {
						debug!("Cannot serve {}: {}", full.display(), e);
						continue;
					}
				},
				Err(_) => continue,
			};
			let file = FilePayload {
				team_id,
				path,
				hash: entry.hash.clone(),
				mod_time: entry.mod_time,
				data_b64: STANDARD.encode(&data),
			};
			writer.encode(&WireMessage::File(file)).await?;
			served += 1;
		}

		writer.encode(&WireMessage::FileDone).await?;
		if let Err(e) = writer.shutdown().await {
			debug!("Shutdown after file_done: {}", e);
		}
		Ok(served)
	}
}

/// Run filesystem work off the async workers
async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
	F: FnOnce() -> Result<T, SyncError> + Send + 'static,
	T: Send + 'static,
{
	tokio::task::spawn_blocking(f)
		.await
		.map_err(|e| SyncError::Other { message: format!("blocking task failed: {}", e) })?
}


// vim: ts=4
