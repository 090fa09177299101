//! Configuration document: the unit of replication
//!
//! The document is owned by the host application; the engine only reads it,
//! merges peers' team-scoped copies into it, and hands back the result.
//! Numeric `id`s are local display handles. Cross-peer identity is carried by
//! `uid` (networks, hosts) or the opaque string `id` (teams, scripts).

pub mod normalize;

use crate::version::VersionVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk document version
pub const DOCUMENT_VERSION: u32 = 2;

/// Generate a fresh opaque identifier (device ids, UIDs, team ids)
pub fn new_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

fn is_zero_i64(v: &i64) -> bool {
	*v == 0
}

fn is_false(v: &bool) -> bool {
	!*v
}

/// Visibility of a script or host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
	#[default]
	Private,
	Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
	Admin,
	#[default]
	#[serde(other)]
	User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
	Approved,
	Declined,
	#[default]
	#[serde(other)]
	Pending,
}

impl JoinStatus {
	/// Preference on an exact timestamp tie: Approved > Pending > Declined
	pub fn priority(self) -> u8 {
		match self {
			JoinStatus::Approved => 3,
			JoinStatus::Pending => 2,
			JoinStatus::Declined => 1,
		}
	}
}

/// Replication metadata carried by every replicated entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncMeta {
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub updated_at: i64,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub updated_by: String,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub version: VersionVector,
	#[serde(skip_serializing_if = "is_false")]
	pub conflict: bool,
	#[serde(skip_serializing_if = "is_false")]
	pub deleted: bool,
}

/// Local device identity. `device_id` never leaves through merges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
	#[serde(skip_serializing_if = "String::is_empty")]
	pub email: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub name: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub device_id: String,
}

impl UserProfile {
	/// Human-readable actor recorded in `updated_by`
	pub fn actor_name(&self) -> String {
		if !self.email.trim().is_empty() {
			return self.email.clone();
		}
		if !self.name.trim().is_empty() {
			return self.name.clone();
		}
		self.device_id.clone()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamMember {
	pub email: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub name: String,
	pub role: TeamRole,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamJoinRequest {
	#[serde(skip_serializing_if = "String::is_empty")]
	pub id: String,
	pub email: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub name: String,
	pub status: JoinStatus,
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub requested_at: i64,
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub resolved_at: i64,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub resolved_by: String,
}

impl TeamJoinRequest {
	/// Resolution time if resolved, else request time
	pub fn effective_at(&self) -> i64 {
		if self.status != JoinStatus::Pending && self.resolved_at > 0 {
			return self.resolved_at;
		}
		self.requested_at
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Team {
	pub id: String,
	pub name: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub members: Vec<TeamMember>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub requests: Vec<TeamJoinRequest>,
	#[serde(flatten)]
	pub sync: SyncMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamScript {
	pub id: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub team_id: String,
	pub scope: Scope,
	pub name: String,
	pub command: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub description: String,
	#[serde(flatten)]
	pub sync: SyncMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
	#[default]
	Password,
	Key,
	Agent,
	KeyboardInteractive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
	pub method: AuthMethod,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub key_path: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyMode {
	#[default]
	KnownHosts,
	Insecure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostKeyConfig {
	pub mode: HostKeyMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
	#[default]
	Ssh,
	Telecom,
}

/// Local-process connection driver settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelecomConfig {
	#[serde(skip_serializing_if = "String::is_empty")]
	pub path: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub protocol: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub command: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<String>,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub work_dir: String,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SftpCredentials {
	#[default]
	Connection,
	Custom,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SftpConfig {
	pub enabled: bool,
	pub credentials: SftpCredentials,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub user: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Host {
	pub id: u32,
	pub name: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub uid: String,
	pub host: String,
	pub port: u16,
	pub user: String,
	pub driver: Driver,
	pub auth: AuthConfig,
	pub host_key: HostKeyConfig,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub telecom: Option<TelecomConfig>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sftp: Option<SftpConfig>,
	pub scope: Scope,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub team_id: String,
	#[serde(flatten)]
	pub sync: SyncMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Network {
	pub id: u32,
	pub name: String,
	pub hosts: Vec<Host>,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub uid: String,
	/// Owning team; empty means private/personal
	#[serde(skip_serializing_if = "String::is_empty")]
	pub team_id: String,
	#[serde(flatten)]
	pub sync: SyncMeta,
}

impl Network {
	/// Team id of the first team-scoped host, if any
	pub fn inferred_team_id(&self) -> Option<&str> {
		self.hosts
			.iter()
			.find(|h| h.scope == Scope::Team && !h.team_id.is_empty())
			.map(|h| h.team_id.as_str())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
	pub version: u32,
	pub user: UserProfile,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub teams: Vec<Team>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub scripts: Vec<TeamScript>,
	pub networks: Vec<Network>,
}

impl AppConfig {
	/// Ids of teams that are not tombstoned
	pub fn active_team_ids(&self) -> Vec<&str> {
		self.teams
			.iter()
			.filter(|t| !t.id.is_empty() && !t.sync.deleted)
			.map(|t| t.id.as_str())
			.collect()
	}

	/// Subset of the document that may leave this device.
	///
	/// Teams are carried whole (tombstones included). Networks, hosts and
	/// scripts are kept only when team-scoped to one of this document's
	/// active teams; everything private is stripped.
	pub fn team_scoped(&self) -> AppConfig {
		let teams = self.active_team_ids();
		let member_of = |team_id: &str| !team_id.is_empty() && teams.contains(&team_id);

		let networks = self
			.networks
			.iter()
			.filter(|n| member_of(&n.team_id))
			.filter_map(|n| {
				let hosts: Vec<Host> = n
					.hosts
					.iter()
					.filter(|h| h.scope == Scope::Team && h.team_id == n.team_id)
					.cloned()
					.collect();
				if hosts.is_empty() {
					return None;
				}
				Some(Network { hosts, ..n.clone() })
			})
			.collect();

		let scripts = self
			.scripts
			.iter()
			.filter(|s| s.scope == Scope::Team && member_of(&s.team_id))
			.cloned()
			.collect();

		AppConfig {
			version: self.version,
			user: self.user.clone(),
			teams: self.teams.clone(),
			scripts,
			networks,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn team_host(name: &str, team_id: &str) -> Host {
		Host {
			name: name.to_string(),
			uid: new_id(),
			scope: Scope::Team,
			team_id: team_id.to_string(),
			..Default::default()
		}
	}

	#[test]
	fn test_team_scoped_strips_private_data() {
		let mut private = team_host("laptop", "");
		private.scope = Scope::Private;

		let doc = AppConfig {
			teams: vec![Team { id: "t1".into(), name: "Ops".into(), ..Default::default() }],
			networks: vec![
				Network {
					uid: "n1".into(),
					team_id: "t1".into(),
					hosts: vec![team_host("db", "t1"), private.clone()],
					..Default::default()
				},
				Network { uid: "n2".into(), hosts: vec![private], ..Default::default() },
			],
			scripts: vec![
				TeamScript {
					id: "s1".into(),
					scope: Scope::Team,
					team_id: "t1".into(),
					..Default::default()
				},
				TeamScript { id: "s2".into(), ..Default::default() },
			],
			..Default::default()
		};

		let view = doc.team_scoped();
		assert_eq!(view.networks.len(), 1);
		assert_eq!(view.networks[0].hosts.len(), 1);
		assert_eq!(view.networks[0].hosts[0].name, "db");
		assert_eq!(view.scripts.len(), 1);
		assert_eq!(view.scripts[0].id, "s1");
	}

	#[test]
	fn test_team_scoped_skips_foreign_teams() {
		let doc = AppConfig {
			teams: vec![Team { id: "t1".into(), ..Default::default() }],
			networks: vec![Network {
				uid: "n1".into(),
				team_id: "t9".into(),
				hosts: vec![team_host("db", "t9")],
				..Default::default()
			}],
			..Default::default()
		};
		assert!(doc.team_scoped().networks.is_empty());
	}

	#[test]
	fn test_unknown_role_reads_as_user() {
		let m: TeamMember = serde_json::from_str(r#"{"email":"a@x","role":"owner"}"#).unwrap();
		assert_eq!(m.role, TeamRole::User);
	}

	#[test]
	fn test_unknown_join_status_reads_as_pending() {
		let r: TeamJoinRequest = serde_json::from_str(r#"{"email":"a@x","status":"bogus"}"#).unwrap();
		assert_eq!(r.status, JoinStatus::Pending);
		let r: TeamJoinRequest = serde_json::from_str(r#"{"email":"a@x","status":"declined"}"#).unwrap();
		assert_eq!(r.status, JoinStatus::Declined);
	}

	#[test]
	fn test_sync_meta_flattened() {
		let mut team = Team { id: "t1".into(), name: "Ops".into(), ..Default::default() };
		team.sync.version.insert("dev-a".into(), 2);
		team.sync.deleted = true;

		let json = serde_json::to_value(&team).unwrap();
		assert_eq!(json["version"]["dev-a"], 2);
		assert_eq!(json["deleted"], true);
		assert!(json.get("conflict").is_none());

		let back: Team = serde_json::from_value(json).unwrap();
		assert_eq!(back, team);
	}
}

// vim: ts=4
