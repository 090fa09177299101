//! Team membership and join-request reconciliation

use crate::model::{Team, TeamJoinRequest, TeamMember, TeamRole};
use std::collections::BTreeMap;

/// Trim names, lowercase emails, drop blank emails and collapse duplicates.
///
/// A duplicated email keeps the admin role if any copy has it and the
/// first non-blank name. Output is sorted by email.
pub fn normalize_members(members: &[TeamMember]) -> Vec<TeamMember> {
	merge_members(members, &[])
}

/// Union of two member lists keyed by lowercased email
pub fn merge_members(a: &[TeamMember], b: &[TeamMember]) -> Vec<TeamMember> {
	let mut by_email: BTreeMap<String, TeamMember> = BTreeMap::new();
	for member in a.iter().chain(b.iter()) {
		let email = member.email.trim().to_lowercase();
		if email.is_empty() {
			continue;
		}
		let name = member.name.trim().to_string();
		match by_email.get_mut(&email) {
			Some(existing) => {
				if member.role == TeamRole::Admin {
					existing.role = TeamRole::Admin;
				}
				if existing.name.is_empty() && !name.is_empty() {
					existing.name = name;
				}
			}
			None => {
				by_email.insert(email.clone(), TeamMember { email, name, role: member.role });
			}
		}
	}
	by_email.into_values().collect()
}

/// Pick the authoritative copy of one applicant's request.
///
/// The later effective time wins; on an exact tie Approved beats Pending
/// beats Declined; a full tie keeps `a`.
pub fn pick_join_request<'a>(a: &'a TeamJoinRequest, b: &'a TeamJoinRequest) -> &'a TeamJoinRequest {
	let (at, bt) = (a.effective_at(), b.effective_at());
	if bt > at {
		return b;
	}
	if at > bt {
		return a;
	}
	if b.status.priority() > a.status.priority() {
		return b;
	}
	a
}

fn clean_request(req: &TeamJoinRequest) -> Option<TeamJoinRequest> {
	let email = req.email.trim().to_lowercase();
	if email.is_empty() {
		return None;
	}
	Some(TeamJoinRequest {
		email,
		name: req.name.trim().to_string(),
		id: req.id.trim().to_string(),
		resolved_by: req.resolved_by.trim().to_string(),
		..req.clone()
	})
}

/// One request per applicant email; sorted by email
pub fn merge_requests(a: &[TeamJoinRequest], b: &[TeamJoinRequest]) -> Vec<TeamJoinRequest> {
	let mut by_email: BTreeMap<String, TeamJoinRequest> = BTreeMap::new();
	for req in a.iter().chain(b.iter()).filter_map(clean_request) {
		let winner = match by_email.get(&req.email) {
			Some(existing) => pick_join_request(existing, &req).clone(),
			None => req,
		};
		by_email.insert(winner.email.clone(), winner);
	}
	by_email.into_values().collect()
}

pub(crate) fn normalize_requests(requests: &[TeamJoinRequest]) -> Vec<TeamJoinRequest> {
	merge_requests(requests, &[])
}

pub(crate) fn team_same_content(a: &Team, b: &Team) -> bool {
	a.name.trim() == b.name.trim()
		&& normalize_members(&a.members) == normalize_members(&b.members)
		&& normalize_requests(&a.requests) == normalize_requests(&b.requests)
}


// vim: ts=4
