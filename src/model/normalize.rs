//! Repair a freshly loaded document so the merge engine can rely on its
//! identity invariants

use super::{new_id, AppConfig, Scope, TeamRole};
use crate::merge::{normalize_host_scope, normalize_members, normalize_requests, IdAllocator};
use std::collections::HashSet;

/// Normalize `doc` in place. Returns whether anything was modified.
pub fn normalize(doc: &mut AppConfig) -> bool {
	let before = doc.clone();

	if doc.user.device_id.trim().is_empty() {
		doc.user.device_id = new_id();
	}

	let mut team_ids = HashSet::new();
	for team in &mut doc.teams {
		if team.id.is_empty() || !team_ids.insert(team.id.clone()) {
			team.id = new_id();
			team_ids.insert(team.id.clone());
		}
		team.name = team.name.trim().to_string();
		team.members = normalize_members(&team.members);
		if !team.members.is_empty() && team.members.iter().all(|m| m.role != TeamRole::Admin) {
			team.members[0].role = TeamRole::Admin;
		}
		team.requests = normalize_requests(&team.requests);
		for req in &mut team.requests {
			if req.id.is_empty() {
				req.id = new_id();
			}
		}
	}

	let mut script_ids = HashSet::new();
	for script in &mut doc.scripts {
		if script.id.is_empty() || !script_ids.insert(script.id.clone()) {
			script.id = new_id();
			script_ids.insert(script.id.clone());
		}
		if script.scope == Scope::Private {
			script.team_id.clear();
		}
	}

	let mut net_ids = IdAllocator::new(doc.networks.iter().map(|n| n.id));
	let mut host_ids =
		IdAllocator::new(doc.networks.iter().flat_map(|n| n.hosts.iter().map(|h| h.id)));
	let mut taken_nets = HashSet::new();
	let mut taken_hosts = HashSet::new();
	let mut uids = HashSet::new();

	for network in &mut doc.networks {
		if network.uid.is_empty() || !uids.insert(network.uid.clone()) {
			network.uid = new_id();
			uids.insert(network.uid.clone());
		}
		if network.id == 0 || !taken_nets.insert(network.id) {
			network.id = net_ids.next_id();
			taken_nets.insert(network.id);
		}

		for host in &mut network.hosts {
			if host.uid.is_empty() || !uids.insert(host.uid.clone()) {
				host.uid = new_id();
				uids.insert(host.uid.clone());
			}
			if host.id == 0 || !taken_hosts.insert(host.id) {
				host.id = host_ids.next_id();
				taken_hosts.insert(host.id);
			}
			normalize_host_scope(host, &network.team_id);
		}

		if network.team_id.is_empty() {
			if let Some(team_id) = network.inferred_team_id() {
				network.team_id = team_id.to_string();
			}
		}
	}

	*doc != before
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Host, JoinStatus, Network, Team, TeamJoinRequest, TeamMember};

	#[test]
	fn test_fills_identity() {
		let mut doc = AppConfig {
			networks: vec![
				Network { hosts: vec![Host::default(), Host { id: 1, ..Default::default() }], ..Default::default() },
				Network { id: 1, ..Default::default() },
			],
			..Default::default()
		};
		assert!(normalize(&mut doc));

		assert!(!doc.user.device_id.is_empty());
		let net_ids: Vec<u32> = doc.networks.iter().map(|n| n.id).collect();
		assert_eq!(net_ids, vec![2, 1]);
		let host_ids: Vec<u32> = doc.networks[0].hosts.iter().map(|h| h.id).collect();
		assert_eq!(host_ids, vec![2, 1]);
		assert!(doc.networks.iter().all(|n| !n.uid.is_empty()));

		// Second pass is a fixpoint
		assert!(!normalize(&mut doc));
	}

	#[test]
	fn test_team_members_and_requests() {
		let mut doc = AppConfig {
			teams: vec![Team {
				id: "t1".into(),
				name: " Ops ".into(),
				members: vec![
					TeamMember { email: "B@x.io".into(), ..Default::default() },
					TeamMember { email: "a@x.io".into(), ..Default::default() },
				],
				requests: vec![
					TeamJoinRequest { email: "c@x.io".into(), requested_at: 5, ..Default::default() },
					TeamJoinRequest {
						email: "C@x.io".into(),
						status: JoinStatus::Declined,
						requested_at: 5,
						resolved_at: 9,
						..Default::default()
					},
				],
				..Default::default()
			}],
			..Default::default()
		};
		normalize(&mut doc);

		let team = &doc.teams[0];
		assert_eq!(team.name, "Ops");
		assert_eq!(team.members[0].email, "a@x.io");
		assert_eq!(team.members[0].role, TeamRole::Admin);
		assert_eq!(team.members[1].role, TeamRole::User);
		assert_eq!(team.requests.len(), 1);
		assert_eq!(team.requests[0].status, JoinStatus::Declined);
		assert!(!team.requests[0].id.is_empty());
	}

	#[test]
	fn test_scope_rules() {
		let mut doc = AppConfig {
			networks: vec![Network {
				id: 1,
				uid: "n1".into(),
				hosts: vec![
					Host { id: 1, uid: "h1".into(), scope: Scope::Team, team_id: "t1".into(), ..Default::default() },
					Host { id: 2, uid: "h2".into(), team_id: "t1".into(), ..Default::default() },
				],
				..Default::default()
			}],
			..Default::default()
		};
		doc.user.device_id = "dev".into();
		assert!(normalize(&mut doc));
		assert_eq!(doc.networks[0].team_id, "t1");
		assert_eq!(doc.networks[0].hosts[1].team_id, "");
	}
}

// vim: ts=4
