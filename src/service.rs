//! The running peer: sockets, timers and the public API
//!
//! Four long-lived tasks share one [`SyncEngine`] and one [`PeerTable`]:
//! - announce: broadcast a hello every announce interval
//! - listen: receive hellos and refresh the peer table
//! - sync: every sync interval, dial each peer that is due
//! - accept: run a session for every inbound connection
//!
//! Every session runs in its own task. [`SyncService::close`] stops the four
//! loops; sessions already running finish on their own deadline.

use crate::callbacks::{CallbackBuilder, SyncCallbacks};
use crate::config::Config;
use crate::discovery::{
	accept_hello, broadcast_addrs, build_hello, local_hostname, PeerInfo, PeerTable, PresenceSnapshot,
};
use crate::error::SyncError;
use crate::exclusion::PatternMatcher;
use crate::logging::*;
use crate::model::AppConfig;
use crate::protocol::{load_secret, ProtocolError, SharedSecret};
use crate::session::{SessionReport, SessionSettings, SyncEngine};
use crate::store::TeamStore;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

fn unix_now() -> i64 {
	chrono::Utc::now().timestamp()
}

type SharedPeers = Arc<Mutex<PeerTable>>;

fn lock_peers(peers: &Mutex<PeerTable>) -> MutexGuard<'_, PeerTable> {
	peers.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SyncService {
	engine: Arc<SyncEngine>,
	peers: SharedPeers,
	tcp_port: u16,
	udp_addr: SocketAddr,
	shutdown: watch::Sender<bool>,
}

impl SyncService {
	/// Start with the shared secret taken from the environment variables
	/// named in `config`.
	pub async fn start(doc: AppConfig, config: Config) -> Result<Self, SyncError> {
		let secret = load_secret(&config.secret_env, &config.insecure_env)?;
		Self::start_with_secret(doc, config, secret).await
	}

	/// Bind the sockets and spawn the background loops.
	///
	/// `secret` of `None` runs in plain, unauthenticated mode.
	pub async fn start_with_secret(
		doc: AppConfig,
		config: Config,
		secret: Option<SharedSecret>,
	) -> Result<Self, SyncError> {
		if doc.user.device_id.trim().is_empty() {
			return Err(SyncError::InvalidConfig { message: "missing device id".to_string() });
		}
		config.validate()?;

		let matcher = PatternMatcher::new(&config.exclude_patterns)
			.map_err(|e| SyncError::InvalidConfig { message: e.to_string() })?;
		let store = TeamStore::new(&config.data_dir, matcher);
		let engine = Arc::new(SyncEngine::new(doc, store, secret, SessionSettings::from_config(&config)));

		let udp = UdpSocket::bind(("0.0.0.0", config.udp_port)).await?;
		udp.set_broadcast(true)?;
		let udp_addr = udp.local_addr()?;
		let udp = Arc::new(udp);

		let listener = TcpListener::bind(&config.listen_addr).await?;
		let tcp_port = listener.local_addr()?.port();

		let targets = broadcast_addrs(config.udp_port);
		info!(
			"Peer sync listening on tcp/{} (discovery udp/{}, {} broadcast targets, {})",
			tcp_port,
			udp_addr.port(),
			targets.len(),
			if engine.secret().is_some() { "secured" } else { "INSECURE" }
		);

		let peers: SharedPeers = Arc::new(Mutex::new(PeerTable::new()));
		let (shutdown, stop) = watch::channel(false);
		let config = Arc::new(config);

		tokio::spawn(announce_loop(engine.clone(), udp.clone(), targets, tcp_port, config.clone(), stop.clone()));
		tokio::spawn(listen_loop(engine.clone(), udp, peers.clone(), config.clone(), stop.clone()));
		tokio::spawn(sync_loop(engine.clone(), peers.clone(), config, stop.clone()));
		tokio::spawn(accept_loop(engine.clone(), listener, stop));

		Ok(SyncService { engine, peers, tcp_port, udp_addr, shutdown })
	}

	/// Stop the background loops and release the sockets
	pub fn close(&self) {
		self.shutdown.send_replace(true);
	}

	pub fn is_closed(&self) -> bool {
		*self.shutdown.borrow()
	}

	/// Replace the working document. Never waits on the network.
	pub fn set_config(&self, doc: AppConfig) {
		self.engine.set_document(doc);
	}

	/// Current working document, including merges from peers
	pub fn config(&self) -> AppConfig {
		self.engine.document()
	}

	/// Register the merged-document handler, replacing any callbacks
	pub fn set_on_merged<F>(&self, callback: F)
	where
		F: Fn(&AppConfig) + Send + Sync + 'static,
	{
		self.set_callbacks(Arc::from(CallbackBuilder::new().on_merged(callback).build()));
	}

	pub fn set_callbacks(&self, callbacks: Arc<dyn SyncCallbacks>) {
		self.engine.set_callbacks(callbacks);
	}

	pub fn peers(&self) -> Vec<PeerInfo> {
		lock_peers(&self.peers).peers()
	}

	pub fn presence(&self) -> PresenceSnapshot {
		PresenceSnapshot { peers: self.peers(), user: self.engine.document().user }
	}

	/// Make every known peer due on the next sync tick
	pub fn sync_now(&self) {
		lock_peers(&self.peers).reset_sync();
	}

	/// TCP port accepting sync sessions
	pub fn tcp_port(&self) -> u16 {
		self.tcp_port
	}

	/// Local address of the discovery socket
	pub fn udp_addr(&self) -> SocketAddr {
		self.udp_addr
	}

	pub fn engine(&self) -> &Arc<SyncEngine> {
		&self.engine
	}

	/// Dial `addr` and run one session right away
	pub async fn sync_with(&self, addr: SocketAddr, dial_timeout: Duration) -> Result<SessionReport, SyncError> {
		dial_and_sync(&self.engine, addr, dial_timeout).await
	}
}

impl Drop for SyncService {
	fn drop(&mut self) {
		self.close();
	}
}

async fn dial_and_sync(
	engine: &SyncEngine,
	addr: SocketAddr,
	dial_timeout: Duration,
) -> Result<SessionReport, SyncError> {
	let stream = match tokio::time::timeout(dial_timeout, TcpStream::connect(addr)).await {
		Ok(stream) => stream?,
		Err(_) => return Err(ProtocolError::Timeout.into()),
	};
	stream.set_nodelay(true)?;
	engine.sync_stream(stream).await
}

async fn announce_loop(
	engine: Arc<SyncEngine>,
	udp: Arc<UdpSocket>,
	targets: Vec<SocketAddr>,
	tcp_port: u16,
	config: Arc<Config>,
	mut stop: watch::Receiver<bool>,
) {
	let host = local_hostname();
	let mut ticker = tokio::time::interval(config.announce_interval());
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = ticker.tick() => {}
			_ = stop.changed() => return,
		}

		let doc = engine.document();
		let hello = build_hello(&doc, &host, tcp_port, engine.secret(), unix_now());
		let datagram = match serde_json::to_vec(&hello) {
			Ok(d) => d,
			Err(e) => {
				warn!("Cannot encode hello: {}", e);
				continue;
			}
		};
		for target in &targets {
			if let Err(e) = udp.send_to(&datagram, target).await {
				debug!("Hello to {} failed: {}", target, e);
			}
		}
	}
}

async fn listen_loop(
	engine: Arc<SyncEngine>,
	udp: Arc<UdpSocket>,
	peers: SharedPeers,
	config: Arc<Config>,
	mut stop: watch::Receiver<bool>,
) {
	let mut buf = vec![0u8; config.udp_buffer_size.max(512)];

	loop {
		let (n, from) = tokio::select! {
			received = udp.recv_from(&mut buf) => match received {
				Ok(r) => r,
				Err(e) => {
					debug!("Discovery receive failed: {}", e);
					continue;
				}
			},
			_ = stop.changed() => return,
		};

		let now = unix_now();
		let self_id = engine.device_id();
		if let Some(hello) =
			accept_hello(&buf[..n], &self_id, engine.secret(), now, config.hello_auth_window_secs)
		{
			lock_peers(&peers).upsert(&hello, from.ip(), now);
		}
	}
}

async fn sync_loop(
	engine: Arc<SyncEngine>,
	peers: SharedPeers,
	config: Arc<Config>,
	mut stop: watch::Receiver<bool>,
) {
	let period = config.sync_interval();
	let mut ticker = interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
	let ttl = config.peer_ttl_secs as i64;
	let every = config.sync_interval_secs as i64;

	loop {
		tokio::select! {
			_ = ticker.tick() => {}
			_ = stop.changed() => return,
		}

		let due = lock_peers(&peers).due_peers(unix_now(), ttl, every);
		for peer in due {
			let Some(addr) = peer.sync_addr() else { continue };
			let engine = engine.clone();
			let dial_timeout = config.dial_timeout();
			tokio::spawn(async move {
				match dial_and_sync(&engine, addr, dial_timeout).await {
					Ok(report) => log_report(&report),
					Err(e) => {
						debug!("Sync with {} ({}) failed: {}", peer.device_id, addr, e);
						engine.notify_error(&peer.device_id, &e);
					}
				}
			});
		}
	}
}

async fn accept_loop(engine: Arc<SyncEngine>, listener: TcpListener, mut stop: watch::Receiver<bool>) {
	loop {
		let (stream, from) = tokio::select! {
			accepted = listener.accept() => match accepted {
				Ok(a) => a,
				Err(e) => {
					debug!("Accept failed: {}", e);
					continue;
				}
			},
			_ = stop.changed() => return,
		};

		let engine = engine.clone();
		tokio::spawn(async move {
			if let Err(e) = stream.set_nodelay(true) {
				debug!("set_nodelay on {}: {}", from, e);
			}
			match engine.sync_stream(stream).await {
				Ok(report) => log_report(&report),
				Err(e) => {
					debug!("Inbound sync from {} failed: {}", from, e);
					engine.notify_error(&from.to_string(), &e);
				}
			}
		});
	}
}

fn log_report(report: &SessionReport) {
	debug!(
		"Synced with {}: merged={} wanted={} received={} conflicts={} served={} deleted={}",
		report.peer,
		report.merged,
		report.wanted,
		report.received,
		report.conflicts,
		report.served,
		report.deleted
	);
}

// vim: ts=4
