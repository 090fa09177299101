//! LAN discovery: hello datagrams and the peer table
//!
//! Peers announce themselves with a broadcast [`HelloMessage`] every few
//! seconds. Valid hellos refresh an entry in the [`PeerTable`]; entries are
//! never evicted, stale ones are just skipped when scheduling syncs.

use crate::logging::*;
use crate::model::{AppConfig, UserProfile};
use crate::protocol::messages::HELLO_TYPE;
use crate::protocol::{HelloMessage, SharedSecret, TeamSummary, APP_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// A peer as seen through its hellos
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerInfo {
	pub device_id: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub name: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub email: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub host: String,
	/// Source address of the last hello
	#[serde(skip_serializing_if = "String::is_empty")]
	pub addr: String,
	pub tcp_port: u16,
	/// Unix seconds
	pub last_seen: i64,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub teams: Vec<TeamSummary>,
}

impl PeerInfo {
	/// Address to dial for a sync session
	pub fn sync_addr(&self) -> Option<SocketAddr> {
		if self.tcp_port == 0 {
			return None;
		}
		let ip: IpAddr = self.addr.parse().ok()?;
		Some(SocketAddr::new(ip, self.tcp_port))
	}
}

/// Everything a presence view needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
	pub peers: Vec<PeerInfo>,
	pub user: UserProfile,
}

struct PeerState {
	info: PeerInfo,
	/// Unix seconds of the last sync attempt, 0 for never
	last_sync: i64,
}

/// Known peers keyed by device id
#[derive(Default)]
pub struct PeerTable {
	peers: HashMap<String, PeerState>,
}

impl PeerTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a hello received from `addr` at `now`
	pub fn upsert(&mut self, hello: &HelloMessage, addr: IpAddr, now: i64) {
		let info = PeerInfo {
			device_id: hello.device_id.clone(),
			name: hello.name.clone(),
			email: hello.email.clone(),
			host: hello.host.clone(),
			addr: addr.to_string(),
			tcp_port: hello.tcp_port,
			last_seen: now,
			teams: hello.teams.clone(),
		};
		match self.peers.get_mut(&hello.device_id) {
			Some(state) => state.info = info,
			None => {
				debug!("New peer {} at {}:{}", hello.device_id, addr, hello.tcp_port);
				self.peers.insert(hello.device_id.clone(), PeerState { info, last_sync: 0 });
			}
		}
	}

	/// Peers that are alive and were not synced within `interval_secs`.
	///
	/// Returned peers are marked as synced at `now`.
	pub fn due_peers(&mut self, now: i64, ttl_secs: i64, interval_secs: i64) -> Vec<PeerInfo> {
		let mut due: Vec<PeerInfo> = self
			.peers
			.values_mut()
			.filter(|p| p.info.tcp_port != 0)
			.filter(|p| now - p.info.last_seen <= ttl_secs)
			.filter(|p| p.last_sync == 0 || now - p.last_sync >= interval_secs)
			.map(|p| {
				p.last_sync = now;
				p.info.clone()
			})
			.collect();
		due.sort_by(|a, b| a.device_id.cmp(&b.device_id));
		due
	}

	/// Make every peer due on the next scheduling pass
	pub fn reset_sync(&mut self) {
		for peer in self.peers.values_mut() {
			peer.last_sync = 0;
		}
	}

	/// Snapshot of all known peers, ordered by device id
	pub fn peers(&self) -> Vec<PeerInfo> {
		let mut out: Vec<PeerInfo> = self.peers.values().map(|p| p.info.clone()).collect();
		out.sort_by(|a, b| a.device_id.cmp(&b.device_id));
		out
	}

	pub fn len(&self) -> usize {
		self.peers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.peers.is_empty()
	}
}

/// The hello this device announces.
///
/// With a secret, `ts` and `auth` sign `deviceId|tcpPort|ts`.
pub fn build_hello(
	doc: &AppConfig,
	host: &str,
	tcp_port: u16,
	secret: Option<&SharedSecret>,
	now: i64,
) -> HelloMessage {
	let device_id = doc.user.device_id.clone();
	let (ts, auth) = match secret {
		Some(secret) => (now, secret.hello_auth(&device_id, tcp_port, now)),
		None => (0, String::new()),
	};
	HelloMessage {
		app: APP_NAME.to_string(),
		kind: HELLO_TYPE.to_string(),
		device_id,
		name: doc.user.name.clone(),
		email: doc.user.email.clone(),
		host: host.to_string(),
		tcp_port,
		teams: TeamSummary::of(doc),
		ts,
		auth,
	}
}

/// Parse and validate a received datagram.
///
/// Drops foreign or malformed datagrams, hellos without a device id, our
/// own hellos and, with a secret, hellos that fail the signature or time
/// window check.
pub fn accept_hello(
	datagram: &[u8],
	self_id: &str,
	secret: Option<&SharedSecret>,
	now: i64,
	window_secs: i64,
) -> Option<HelloMessage> {
	let hello: HelloMessage = serde_json::from_slice(datagram).ok()?;
	if hello.app != APP_NAME || hello.kind != HELLO_TYPE {
		return None;
	}
	if hello.device_id.is_empty() || hello.device_id == self_id {
		return None;
	}
	if let Some(secret) = secret {
		if !secret.verify_hello(&hello.device_id, hello.tcp_port, hello.ts, &hello.auth, now, window_secs) {
			debug!("Dropping unauthenticated hello from {}", hello.device_id);
			return None;
		}
	}
	Some(hello)
}

/// Directed broadcast address of an IPv4 interface address
pub fn directed_broadcast(ip: Ipv4Addr, prefix: u8) -> Option<Ipv4Addr> {
	if prefix == 0 || prefix >= 32 {
		return None;
	}
	let mask = u32::MAX << (32 - prefix);
	Some(Ipv4Addr::from(u32::from(ip) | !mask))
}

/// Broadcast targets: every non-loopback IPv4 interface's directed
/// broadcast address, then the limited broadcast address.
///
/// `sysinfo` reports addresses but not the link state, so an interface that
/// is administratively down but still holds an address is included. Sends
/// to it fail and are only logged at debug level.
pub fn broadcast_addrs(port: u16) -> Vec<SocketAddr> {
	let networks = sysinfo::Networks::new_with_refreshed_list();
	let mut targets: Vec<SocketAddr> = Vec::new();

	for (_name, data) in &networks {
		for net in data.ip_networks() {
			let IpAddr::V4(ip) = net.addr else { continue };
			if ip.is_loopback() || ip.is_unspecified() || ip.is_link_local() {
				continue;
			}
			if let Some(bcast) = directed_broadcast(ip, net.prefix) {
				let addr = SocketAddr::new(IpAddr::V4(bcast), port);
				if !targets.contains(&addr) {
					targets.push(addr);
				}
			}
		}
	}

	targets.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port));
	targets
}

/// This machine's host name, or empty
pub fn local_hostname() -> String {
	sysinfo::System::host_name().unwrap_or_default()
}


// vim: ts=4
