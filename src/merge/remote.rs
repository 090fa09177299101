//! Folding a peer's team-scoped document into the local one

use super::teams::{merge_members, merge_requests};
use super::{compare_meta, conflict_key, conflict_name, IdAllocator, Replicated};
use crate::model::{AppConfig, Host, Network, Team, TeamScript};
use crate::version::{join_versions, VersionOrder};
use std::collections::HashMap;

/// Local collection in its original order with a key index
struct Keyed<T> {
	items: Vec<T>,
	index: HashMap<String, usize>,
}

impl<T: Replicated> Keyed<T> {
	fn new(items: &[T]) -> Self {
		let items = items.to_vec();
		let index = items
			.iter()
			.enumerate()
			.filter(|(_, item)| !item.key().is_empty())
			.map(|(i, item)| (item.key().to_string(), i))
			.collect();
		Keyed { items, index }
	}

	fn position(&self, key: &str) -> Option<usize> {
		self.index.get(key).copied()
	}

	fn push(&mut self, item: T) {
		self.index.insert(item.key().to_string(), self.items.len());
		self.items.push(item);
	}
}

/// Merge `remote` into `local`. The result keeps the local user profile.
pub fn merge_remote(local: &AppConfig, remote: &AppConfig) -> (AppConfig, bool) {
	let mut changed = false;
	let mut merged = local.clone();

	merged.teams = merge_teams(&local.teams, &remote.teams, &mut changed);
	merged.scripts = merge_entities(&local.scripts, &remote.scripts, &mut changed, |_: &mut TeamScript, _| {});

	let all_networks = || local.networks.iter().chain(remote.networks.iter());
	let mut net_ids = IdAllocator::new(all_networks().map(|n| n.id));
	let mut host_ids = IdAllocator::new(all_networks().flat_map(|n| n.hosts.iter().map(|h| h.id)));
	merged.networks = merge_networks(
		&local.networks,
		&remote.networks,
		&mut changed,
		&mut net_ids,
		&mut host_ids,
	);

	(merged, changed)
}

/// Merge one collection keyed by identity, cloning concurrent revisions.
///
/// `localize` assigns local-only fields to an incoming item: it receives the
/// local revision being replaced, or `None` for adopted items and clones.
fn merge_entities<T, F>(local: &[T], remote: &[T], changed: &mut bool, mut localize: F) -> Vec<T>
where
	T: Replicated,
	F: FnMut(&mut T, Option<&T>),
{
	let mut out = Keyed::new(local);
	for r in remote {
		if r.key().is_empty() {
			continue;
		}
		let mut incoming = r.clone();
		let Some(i) = out.position(r.key()) else {
			localize(&mut incoming, None);
			out.push(incoming);
			*changed = true;
			continue;
		};

		match compare_meta(out.items[i].meta(), r.meta()) {
			VersionOrder::Less => {
				localize(&mut incoming, Some(&out.items[i]));
				out.items[i] = incoming;
				*changed = true;
			}
			VersionOrder::Concurrent => {
				if !out.items[i].meta().conflict {
					out.items[i].meta_mut().conflict = true;
					*changed = true;
				}
				let key = conflict_key(r.key(), r.meta());
				if out.position(&key).is_none() {
					incoming.set_key(key);
					incoming.set_name(conflict_name(r.name()));
					incoming.meta_mut().conflict = true;
					localize(&mut incoming, None);
					out.push(incoming);
					*changed = true;
				}
			}
			VersionOrder::Equal | VersionOrder::Greater => {}
		}
	}
	out.items
}

fn merge_hosts(local: &[Host], remote: &[Host], changed: &mut bool, ids: &mut IdAllocator) -> Vec<Host> {
	let mut hosts = merge_entities(local, remote, changed, |host, prev| {
		host.id = match prev {
			Some(prev) if prev.id > 0 => prev.id,
			_ => ids.next_id(),
		};
	});

	// Local hosts the peer also has get a display id if they lack one
	for host in hosts.iter_mut().filter(|h| h.id == 0) {
		if remote.iter().any(|r| !r.uid.is_empty() && r.uid == host.uid) {
			host.id = ids.next_id();
			*changed = true;
		}
	}
	hosts
}

fn merge_networks(
	local: &[Network],
	remote: &[Network],
	changed: &mut bool,
	net_ids: &mut IdAllocator,
	host_ids: &mut IdAllocator,
) -> Vec<Network> {
	let mut out = Keyed::new(local);
	for r in remote {
		if r.uid.is_empty() {
			continue;
		}
		let Some(i) = out.position(&r.uid) else {
			let mut adopted = r.clone();
			adopted.id = net_ids.next_id();
			adopted.hosts = merge_hosts(&[], &r.hosts, changed, host_ids);
			infer_team(&mut adopted);
			out.push(adopted);
			*changed = true;
			continue;
		};

		if out.items[i].id == 0 {
			out.items[i].id = net_ids.next_id();
			*changed = true;
		}

		match compare_meta(&out.items[i].sync, &r.sync) {
			VersionOrder::Less => {
				// Hosts replicate on their own
				let l = &mut out.items[i];
				l.name = r.name.clone();
				l.team_id = r.team_id.clone();
				l.sync = r.sync.clone();
				*changed = true;
			}
			VersionOrder::Concurrent => {
				if !out.items[i].sync.conflict {
					out.items[i].sync.conflict = true;
					*changed = true;
				}
				let uid = conflict_key(&r.uid, &r.sync);
				if out.position(&uid).is_none() {
					let mut clone = Network {
						id: net_ids.next_id(),
						name: conflict_name(&r.name),
						hosts: Vec::new(),
						uid,
						team_id: r.team_id.clone(),
						sync: r.sync.clone(),
					};
					clone.sync.conflict = true;
					out.push(clone);
					*changed = true;
				}
			}
			VersionOrder::Equal | VersionOrder::Greater => {}
		}

		let l = &mut out.items[i];
		l.hosts = merge_hosts(&l.hosts, &r.hosts, changed, host_ids);
		if infer_team(l) {
			*changed = true;
		}
	}
	out.items
}

fn infer_team(network: &mut Network) -> bool {
	if !network.team_id.is_empty() {
		return false;
	}
	match network.inferred_team_id() {
		Some(team_id) => {
			network.team_id = team_id.to_string();
			true
		}
		None => false,
	}
}

/// Concurrent team revisions: union the members and flag the conflict.
///
/// The result is the same whichever side computes it, so both peers land
/// on an identical team and the next exchange compares equal.
fn merge_concurrent_team(l: &Team, r: &Team) -> Team {
	let remote_later = (r.sync.updated_at, r.name.as_str()) > (l.sync.updated_at, l.name.as_str());
	let (later, earlier) = if remote_later { (r, l) } else { (l, r) };

	let mut merged = l.clone();
	merged.name = later.name.clone();
	merged.members = merge_members(&later.members, &earlier.members);
	merged.sync.version = join_versions(&l.sync.version, &r.sync.version);
	merged.sync.updated_at = later.sync.updated_at;
	merged.sync.updated_by = later.sync.updated_by.clone();
	// An edit on either side revives a concurrent deletion
	merged.sync.deleted = l.sync.deleted && r.sync.deleted;
	merged.sync.conflict = true;
	merged
}

fn merge_teams(local: &[Team], remote: &[Team], changed: &mut bool) -> Vec<Team> {
	let mut out = Keyed::new(local);
	for r in remote {
		if r.id.is_empty() {
			continue;
		}
		let Some(i) = out.position(&r.id) else {
			out.push(r.clone());
			*changed = true;
			continue;
		};

		let base_requests = out.items[i].requests.clone();
		let l = &mut out.items[i];
		match compare_meta(&l.sync, &r.sync) {
			VersionOrder::Less => {
				*l = r.clone();
				*changed = true;
			}
			VersionOrder::Concurrent => {
				let merged = merge_concurrent_team(l, r);
				if merged != *l {
					*l = merged;
					*changed = true;
				}
			}
			VersionOrder::Equal | VersionOrder::Greater => {}
		}

		let requests = merge_requests(&base_requests, &r.requests);
		if requests != l.requests {
			l.requests = requests;
			*changed = true;
		}
	}
	out.items
}


// vim: ts=4
