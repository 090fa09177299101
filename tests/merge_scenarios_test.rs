/// Merge scenarios between independent peers
///
/// Every scenario starts from real local edits (`apply_local_edits_at`) so
/// version vectors are produced the way a running peer produces them, then
/// exchanges team-scoped views with `merge_remote`.
use teamsync::merge::{apply_local_edits_at, merge_remote};
use teamsync::model::{AppConfig, Host, Network, Scope, Team, TeamMember, TeamRole, UserProfile};
use teamsync::version::{compare_version, VersionOrder, VersionVector};

fn blank(device: &str) -> AppConfig {
	AppConfig {
		version: 2,
		user: UserProfile {
			device_id: device.into(),
			name: device.into(),
			email: format!("{}@example.com", device.to_lowercase()),
		},
		..Default::default()
	}
}

fn host(uid: &str, name: &str, port: u16) -> Host {
	Host {
		uid: uid.into(),
		name: name.into(),
		host: format!("{}.lan", uid),
		port,
		user: "ops".into(),
		scope: Scope::Team,
		..Default::default()
	}
}

/// Peer A creates team `t1` with network `lab` holding `hosts`
fn founded_by_a(hosts: Vec<Host>) -> AppConfig {
	let base = blank("A");
	let mut edit = base.clone();
	edit.teams.push(Team {
		id: "t1".into(),
		name: "Ops".into(),
		members: vec![TeamMember { email: "a@example.com".into(), name: "A".into(), role: TeamRole::Admin }],
		..Default::default()
	});
	edit.networks.push(Network {
		uid: "n1".into(),
		name: "lab".into(),
		team_id: "t1".into(),
		hosts,
		..Default::default()
	});
	apply_local_edits_at(&base, edit, 100).0
}

/// Peer B after one sync with `a`
fn joined_by_b(a: &AppConfig) -> AppConfig {
	let (b, changed) = merge_remote(&blank("B"), &a.team_scoped());
	assert!(changed);
	b
}

fn edit_host<F: FnOnce(&mut Host)>(doc: &AppConfig, uid: &str, now: i64, f: F) -> AppConfig {
	let mut edit = doc.clone();
	let host = edit.networks[0].hosts.iter_mut().find(|h| h.uid == uid).unwrap();
	f(host);
	let (stamped, changed) = apply_local_edits_at(doc, edit, now);
	assert!(changed);
	stamped
}

fn add_host(doc: &AppConfig, host: Host, now: i64) -> AppConfig {
	let mut edit = doc.clone();
	edit.networks[0].hosts.push(host);
	apply_local_edits_at(doc, edit, now).0
}

fn vv(entries: &[(&str, u64)]) -> VersionVector {
	entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn uids(doc: &AppConfig) -> Vec<String> {
	let mut out: Vec<String> = doc.networks[0].hosts.iter().map(|h| h.uid.clone()).collect();
	out.sort();
	out
}

#[test]
fn test_compare_version_is_inverse() {
	let vectors = [
		vv(&[]),
		vv(&[("A", 1)]),
		vv(&[("A", 2)]),
		vv(&[("B", 1)]),
		vv(&[("A", 1), ("B", 1)]),
		vv(&[("A", 2), ("B", 1)]),
		vv(&[("A", 1), ("B", 3), ("C", 1)]),
	];
	for a in &vectors {
		for b in &vectors {
			let ab = compare_version(a, b, 10, 20);
			let ba = compare_version(b, a, 20, 10);
			assert_eq!(ab, ba.reverse(), "{:?} vs {:?}", a, b);
		}
	}
}

#[test]
fn test_merge_with_self_is_noop() {
	let a = founded_by_a(vec![host("h1", "H1", 22)]);
	let (merged, changed) = merge_remote(&a, &a);
	assert!(!changed);
	assert_eq!(merged, a);
}

#[test]
fn test_same_remote_twice_is_idempotent() {
	let a = founded_by_a(vec![host("h1", "H1", 22)]);
	let b = joined_by_b(&a);
	let a2 = edit_host(&a, "h1", 200, |h| h.port = 2200);

	let (once, changed) = merge_remote(&b, &a2.team_scoped());
	assert!(changed);
	let (twice, changed) = merge_remote(&once, &a2.team_scoped());
	assert!(!changed);
	assert_eq!(once, twice);
}

#[test]
fn test_hosts_added_on_both_sides_are_unioned() {
	let ancestor = founded_by_a(vec![host("h0", "H0", 22)]);
	let b = joined_by_b(&ancestor);

	let a = add_host(&ancestor, host("h1", "H1", 22), 200);
	let b = add_host(&b, host("h2", "H2", 22), 210);

	let (on_b, _) = merge_remote(&b, &a.team_scoped());
	let (on_a, _) = merge_remote(&a, &b.team_scoped());

	for doc in [&on_a, &on_b] {
		assert_eq!(uids(doc), vec!["h0", "h1", "h2"]);
		assert!(!doc.teams[0].sync.conflict);
		assert!(!doc.networks[0].sync.conflict);
		let hosts = &doc.networks[0].hosts;
		let h1 = hosts.iter().find(|h| h.uid == "h1").unwrap();
		let h2 = hosts.iter().find(|h| h.uid == "h2").unwrap();
		assert_eq!(h1.sync.version, vv(&[("A", 1)]));
		assert_eq!(h2.sync.version, vv(&[("B", 1)]));
		assert!(!h1.sync.conflict && !h2.sync.conflict);
	}

	// numeric ids stay unique per device
	let mut ids: Vec<u32> = on_b.networks[0].hosts.iter().map(|h| h.id).collect();
	ids.sort();
	ids.dedup();
	assert_eq!(ids.len(), 3);
}

#[test]
fn test_concurrent_port_edits_produce_conflict_copy() {
	let ancestor = founded_by_a(vec![host("h1", "H1", 22)]);
	let b = joined_by_b(&ancestor);

	let a = edit_host(&ancestor, "h1", 200, |h| h.port = 2200);
	let b = edit_host(&b, "h1", 210, |h| h.port = 2022);
	assert_eq!(a.networks[0].hosts[0].sync.version, vv(&[("A", 2)]));
	assert_eq!(b.networks[0].hosts[0].sync.version, vv(&[("A", 1), ("B", 1)]));

	let (on_b, changed) = merge_remote(&b, &a.team_scoped());
	assert!(changed);
	let hosts = &on_b.networks[0].hosts;
	assert_eq!(hosts.len(), 2);

	let mine = hosts.iter().find(|h| h.uid == "h1").unwrap();
	assert_eq!(mine.port, 2022);
	assert_eq!(mine.name, "H1");
	assert!(mine.sync.conflict);

	let copies: Vec<&Host> = hosts.iter().filter(|h| h.name == "H1 (conflict)").collect();
	assert_eq!(copies.len(), 1);
	assert_eq!(copies[0].port, 2200);
	assert!(copies[0].sync.conflict);
	assert_ne!(copies[0].id, mine.id);

	// a second delivery of the same revision finds the existing copy
	let (again, changed) = merge_remote(&on_b, &a.team_scoped());
	assert!(!changed);
	assert_eq!(again, on_b);
}

#[test]
fn test_local_edit_then_remote_edit_is_concurrent() {
	let ancestor = founded_by_a(vec![host("h1", "H1", 22)]);
	let b = joined_by_b(&ancestor);

	let a = edit_host(&ancestor, "h1", 200, |h| h.user = "root".into());
	let b = edit_host(&b, "h1", 210, |h| h.user = "admin".into());
	let (ha, hb) = (&a.networks[0].hosts[0], &b.networks[0].hosts[0]);
	assert_eq!(
		compare_version(&ha.sync.version, &hb.sync.version, ha.sync.updated_at, hb.sync.updated_at),
		VersionOrder::Concurrent
	);

	let (on_a, _) = merge_remote(&a, &b.team_scoped());
	let users: Vec<&str> = on_a.networks[0].hosts.iter().map(|h| h.user.as_str()).collect();
	assert!(users.contains(&"root") && users.contains(&"admin"));
	assert!(on_a.networks[0].hosts.iter().all(|h| h.sync.conflict));
}

#[test]
fn test_deletion_replicates() {
	let ancestor = founded_by_a(vec![host("h1", "H1", 22), host("h2", "H2", 22)]);
	let b = joined_by_b(&ancestor);

	let mut edit = ancestor.clone();
	edit.networks[0].hosts.retain(|h| h.uid != "h2");
	let (a, _) = apply_local_edits_at(&ancestor, edit, 300);

	let (on_b, changed) = merge_remote(&b, &a.team_scoped());
	assert!(changed);
	let h2 = on_b.networks[0].hosts.iter().find(|h| h.uid == "h2").unwrap();
	assert!(h2.sync.deleted);
}

#[test]
fn test_private_hosts_never_travel() {
	let mut private = host("hp", "Secret box", 22);
	private.scope = Scope::Private;
	let a = founded_by_a(vec![host("h1", "H1", 22), private]);

	let b = joined_by_b(&a);
	assert_eq!(uids(&b), vec!["h1"]);
}

#[test]
fn test_concurrent_team_edits_converge() {
	let ancestor = founded_by_a(vec![host("h1", "H1", 22)]);
	let b = joined_by_b(&ancestor);

	let mut edit = ancestor.clone();
	edit.teams[0].members.push(TeamMember { email: "c@example.com".into(), name: "C".into(), role: TeamRole::User });
	let (a, _) = apply_local_edits_at(&ancestor, edit, 200);

	let mut edit = b.clone();
	edit.teams[0].members.push(TeamMember { email: "d@example.com".into(), name: "D".into(), role: TeamRole::User });
	let (b, _) = apply_local_edits_at(&b, edit, 210);

	let (on_a, _) = merge_remote(&a, &b.team_scoped());
	let (on_b, _) = merge_remote(&b, &a.team_scoped());
	assert_eq!(on_a.teams, on_b.teams);

	let emails: Vec<&str> = on_a.teams[0].members.iter().map(|m| m.email.as_str()).collect();
	assert_eq!(emails.len(), 3);
	assert!(emails.contains(&"c@example.com") && emails.contains(&"d@example.com"));
	assert!(on_a.teams[0].sync.conflict);

	let (settled, changed) = merge_remote(&on_a, &on_b.team_scoped());
	assert!(!changed);
	assert_eq!(settled.teams, on_a.teams);
}

// vim: ts=4
