//! Stamping a locally edited document against its previous revision

use super::{IdAllocator, Replicated, Stamp};
use crate::merge::teams::{normalize_members, normalize_requests};
use crate::model::{new_id, AppConfig, Host, Scope, DOCUMENT_VERSION};
use crate::version::bump_version;
use std::collections::{HashMap, HashSet};

/// Reconcile `incoming` (the user's edit) against `current`, stamping the
/// local device's version on every entity that actually changed.
pub fn apply_local_edits(current: &AppConfig, incoming: AppConfig) -> (AppConfig, bool) {
	apply_local_edits_at(current, incoming, chrono::Utc::now().timestamp())
}

/// [`apply_local_edits`] with an explicit clock
pub fn apply_local_edits_at(current: &AppConfig, mut incoming: AppConfig, now: i64) -> (AppConfig, bool) {
	let mut changed = false;

	if incoming.user.device_id.is_empty() {
		incoming.user.device_id = if current.user.device_id.is_empty() {
			new_id()
		} else {
			current.user.device_id.clone()
		};
		changed = true;
	}
	let stamp = Stamp {
		device_id: incoming.user.device_id.clone(),
		actor: incoming.user.actor_name(),
		now,
	};

	let mut net_ids = IdAllocator::new(
		current.networks.iter().chain(incoming.networks.iter()).map(|n| n.id),
	);
	let mut host_ids = IdAllocator::new(
		current
			.networks
			.iter()
			.chain(incoming.networks.iter())
			.flat_map(|n| n.hosts.iter().map(|h| h.id)),
	);

	let teams = reconcile(
		&current.teams,
		std::mem::take(&mut incoming.teams),
		&stamp,
		&mut changed,
		|team, _, _| {
			team.name = team.name.trim().to_string();
			team.members = normalize_members(&team.members);
			team.requests = normalize_requests(&team.requests);
		},
	);

	let scripts = reconcile(
		&current.scripts,
		std::mem::take(&mut incoming.scripts),
		&stamp,
		&mut changed,
		|script, _, _| {
			if script.scope == Scope::Private {
				script.team_id.clear();
			}
		},
	);

	let mut taken_net_ids = HashSet::new();
	let mut taken_host_ids = HashSet::new();
	let networks = reconcile(
		&current.networks,
		std::mem::take(&mut incoming.networks),
		&stamp,
		&mut changed,
		|network, prev, changed| {
			if let Some(prev) = prev {
				if prev.id > 0 {
					network.id = prev.id;
				}
			}
			if network.id == 0 || !taken_net_ids.insert(network.id) {
				network.id = net_ids.next_id();
				taken_net_ids.insert(network.id);
			}

			let team_id = network.team_id.clone();
			let prev_hosts: &[Host] = prev.map(|p| p.hosts.as_slice()).unwrap_or(&[]);
			network.hosts = reconcile(
				prev_hosts,
				std::mem::take(&mut network.hosts),
				&stamp,
				changed,
				|host, prev_host, _| {
					if let Some(prev_host) = prev_host {
						if prev_host.id > 0 {
							host.id = prev_host.id;
						}
					}
					if host.id == 0 || !taken_host_ids.insert(host.id) {
						host.id = host_ids.next_id();
						taken_host_ids.insert(host.id);
					}
					normalize_host_scope(host, &team_id);
				},
			);

			if network.team_id.is_empty() {
				if let Some(inferred) = network.inferred_team_id() {
					network.team_id = inferred.to_string();
				}
			}
		},
	);

	let doc = AppConfig {
		version: DOCUMENT_VERSION,
		user: incoming.user,
		teams,
		scripts,
		networks,
	};
	(doc, changed)
}

pub(crate) fn normalize_host_scope(host: &mut Host, network_team_id: &str) {
	match host.scope {
		Scope::Private => host.team_id.clear(),
		Scope::Team => {
			if host.team_id.is_empty() {
				host.team_id = network_team_id.to_string();
			}
		}
	}
}

fn restamp<T: Replicated>(item: &mut T, base: &T, stamp: &Stamp) {
	let version = bump_version(&base.meta().version, &stamp.device_id);
	let meta = item.meta_mut();
	meta.version = version;
	meta.updated_at = stamp.now;
	meta.updated_by = stamp.actor.clone();
}

/// Carry or bump metadata of one edited item. Returns whether it changed.
fn stamp_item<T: Replicated>(item: &mut T, prev: Option<&T>, stamp: &Stamp) -> bool {
	match prev {
		Some(prev) => {
			if prev.same_content(item) && prev.meta().deleted == item.meta().deleted {
				*item.meta_mut() = prev.meta().clone();
				return false;
			}
			restamp(item, prev, stamp);
			true
		}
		None => {
			let base = item.clone();
			restamp(item, &base, stamp);
			true
		}
	}
}

/// Walk one edited collection against its previous revision.
///
/// `normalize` runs on every incoming item before stamping, with the previous
/// revision of that item (if any). Previous items missing from `incoming` are
/// kept as tombstones.
fn reconcile<T, F>(
	current: &[T],
	incoming: Vec<T>,
	stamp: &Stamp,
	changed: &mut bool,
	mut normalize: F,
) -> Vec<T>
where
	T: Replicated,
	F: FnMut(&mut T, Option<&T>, &mut bool),
{
	let by_key: HashMap<&str, &T> = current
		.iter()
		.filter(|c| !c.key().is_empty())
		.map(|c| (c.key(), c))
		.collect();

	let mut seen: HashSet<String> = HashSet::new();
	let mut out = Vec::with_capacity(incoming.len());
	for mut item in incoming {
		if item.key().is_empty() || seen.contains(item.key()) {
			item.set_key(new_id());
			*changed = true;
		}
		seen.insert(item.key().to_string());

		let prev = by_key.get(item.key()).copied();
		normalize(&mut item, prev, changed);
		if stamp_item(&mut item, prev, stamp) {
			*changed = true;
		}
		out.push(item);
	}

	for prev in current {
		if prev.key().is_empty() || seen.contains(prev.key()) {
			continue;
		}
		let mut gone = prev.clone();
		if !prev.meta().deleted {
			gone.meta_mut().deleted = true;
			gone.meta_mut().conflict = false;
			restamp(&mut gone, prev, stamp);
			*changed = true;
		}
		out.push(gone);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Network, Team, UserProfile};

	fn doc(device: &str) -> AppConfig {
		AppConfig {
			version: DOCUMENT_VERSION,
			user: UserProfile { device_id: device.into(), email: "a@x.io".into(), ..Default::default() },
			..Default::default()
		}
	}

	fn with_network(mut d: AppConfig, hosts: Vec<Host>) -> AppConfig {
		d.teams = vec![Team { id: "t1".into(), name: "Ops".into(), ..Default::default() }];
		d.networks = vec![Network {
			uid: "n1".into(),
			name: "lab".into(),
			team_id: "t1".into(),
			hosts,
			..Default::default()
		}];
		d
	}

	fn host(uid: &str, port: u16) -> Host {
		Host {
			uid: uid.into(),
			name: uid.into(),
			port,
			scope: Scope::Team,
			..Default::default()
		}
	}

	#[test]
	fn test_new_entities_get_bumped_vector_and_ids() {
		let current = doc("A");
		let incoming = with_network(doc("A"), vec![host("h1", 22)]);
		let (out, changed) = apply_local_edits_at(&current, incoming, 100);

		assert!(changed);
		let net = &out.networks[0];
		assert_eq!(net.id, 1);
		assert_eq!(net.sync.version["A"], 1);
		assert_eq!(net.hosts[0].id, 1);
		assert_eq!(net.hosts[0].team_id, "t1");
		assert_eq!(net.hosts[0].sync.updated_at, 100);
		assert_eq!(net.hosts[0].sync.updated_by, "a@x.io");
		assert_eq!(out.teams[0].sync.version["A"], 1);
	}

	#[test]
	fn test_unchanged_entities_keep_metadata() {
		let (first, _) = apply_local_edits_at(&doc("A"), with_network(doc("A"), vec![host("h1", 22)]), 100);
		let (second, changed) = apply_local_edits_at(&first, first.clone(), 200);

		assert!(!changed);
		assert_eq!(second, first);
	}

	#[test]
	fn test_edit_bumps_only_the_edited_entity() {
		let (first, _) = apply_local_edits_at(&doc("A"), with_network(doc("A"), vec![host("h1", 22)]), 100);
		let mut edit = first.clone();
		edit.networks[0].hosts[0].port = 2200;

		let (second, changed) = apply_local_edits_at(&first, edit, 200);
		assert!(changed);
		assert_eq!(second.networks[0].hosts[0].sync.version["A"], 2);
		assert_eq!(second.networks[0].hosts[0].sync.updated_at, 200);
		assert_eq!(second.networks[0].sync, first.networks[0].sync);
		assert_eq!(second.teams[0].sync, first.teams[0].sync);
	}

	#[test]
	fn test_removed_entities_become_tombstones() {
		let (first, _) = apply_local_edits_at(
			&doc("A"),
			with_network(doc("A"), vec![host("h1", 22), host("h2", 22)]),
			100,
		);
		let mut edit = first.clone();
		edit.networks[0].hosts.retain(|h| h.uid != "h2");

		let (second, changed) = apply_local_edits_at(&first, edit, 200);
		assert!(changed);
		let gone = second.networks[0].hosts.iter().find(|h| h.uid == "h2").unwrap();
		assert!(gone.sync.deleted);
		assert_eq!(gone.sync.version["A"], 2);

		// A tombstone omitted again is carried, not re-bumped
		let mut edit = second.clone();
		edit.networks[0].hosts.retain(|h| h.uid != "h2");
		let (third, changed) = apply_local_edits_at(&second, edit, 300);
		assert!(!changed);
		assert_eq!(third, second);
	}

	#[test]
	fn test_private_scope_clears_team_id() {
		let mut h = host("h1", 22);
		h.scope = Scope::Private;
		h.team_id = "t1".into();
		let (out, _) = apply_local_edits_at(&doc("A"), with_network(doc("A"), vec![h]), 100);
		assert_eq!(out.networks[0].hosts[0].team_id, "");
	}

	#[test]
	fn test_network_infers_team_from_hosts() {
		let mut d = with_network(doc("A"), vec![]);
		let mut h = host("h1", 22);
		h.team_id = "t1".into();
		d.networks[0].team_id.clear();
		d.networks[0].hosts.push(h);

		let (out, _) = apply_local_edits_at(&doc("A"), d, 100);
		assert_eq!(out.networks[0].team_id, "t1");
	}

	#[test]
	fn test_duplicate_ids_reassigned() {
		let mut d = with_network(doc("A"), vec![]);
		let mut second = d.networks[0].clone();
		second.uid = "n2".into();
		d.networks[0].id = 4;
		second.id = 4;
		d.networks.push(second);

		let (out, _) = apply_local_edits_at(&doc("A"), d, 100);
		assert_eq!(out.networks[0].id, 4);
		assert_ne!(out.networks[1].id, 4);
		assert!(out.networks[1].id > 0);
	}

	#[test]
	fn test_missing_uid_is_filled() {
		let mut d = with_network(doc("A"), vec![host("", 22)]);
		d.networks[0].uid.clear();
		let (out, changed) = apply_local_edits_at(&doc("A"), d, 100);
		assert!(changed);
		assert!(!out.networks[0].uid.is_empty());
		assert!(!out.networks[0].hosts[0].uid.is_empty());
	}
}

// vim: ts=4
