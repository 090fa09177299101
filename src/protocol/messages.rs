//! Wire message types
//!
//! Session messages travel over the framing codec and are tagged by a
//! `type` field. The discovery hello is a standalone UDP datagram.

use crate::manifest::Manifest;
use crate::model::{AppConfig, UserProfile};
use serde::{Deserialize, Serialize};

/// Application identifier carried in hellos
pub const APP_NAME: &str = "teamsync";

/// `type` of a discovery datagram
pub const HELLO_TYPE: &str = "hello";

fn is_zero_i64(v: &i64) -> bool {
	*v == 0
}

/// Team id and display name, as advertised to peers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamSummary {
	pub id: String,
	pub name: String,
}

impl TeamSummary {
	/// Summaries of the non-deleted teams of a document
	pub fn of(doc: &AppConfig) -> Vec<TeamSummary> {
		doc.teams
			.iter()
			.filter(|t| !t.id.is_empty() && !t.sync.deleted)
			.map(|t| TeamSummary { id: t.id.clone(), name: t.name.clone() })
			.collect()
	}
}

/// Broadcast presence announcement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelloMessage {
	pub app: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub device_id: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub name: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub email: String,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub host: String,
	pub tcp_port: u16,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub teams: Vec<TeamSummary>,
	/// Unix seconds; present in secured mode
	#[serde(skip_serializing_if = "is_zero_i64")]
	pub ts: i64,
	/// Hex HMAC-SHA256 over `deviceId|tcpPort|ts`
	#[serde(skip_serializing_if = "String::is_empty")]
	pub auth: String,
}

/// First message of a session, sent by both sides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncPayload {
	pub device_id: String,
	pub user: UserProfile,
	/// Team-scoped view of the sender's document
	pub config: AppConfig,
	pub teams: Vec<TeamSummary>,
	pub manifests: Vec<Manifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WantPayload {
	pub team_id: String,
	pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilePayload {
	pub team_id: String,
	pub path: String,
	pub hash: String,
	pub mod_time: i64,
	/// Standard base64 of the file content
	pub data_b64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
	Sync(SyncPayload),
	Want(WantPayload),
	/// No more want batches from the sender
	WantDone,
	File(FilePayload),
	/// The sender has served every want it received
	FileDone,
}

impl WireMessage {
	pub fn kind(&self) -> &'static str {
		match self {
			WireMessage::Sync(_) => "sync",
			WireMessage::Want(_) => "want",
			WireMessage::WantDone => "want_done",
			WireMessage::File(_) => "file",
			WireMessage::FileDone => "file_done",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_wire_shapes() {
		let want = WireMessage::Want(WantPayload { team_id: "t1".into(), paths: vec!["a".into()] });
		let json = serde_json::to_value(&want).unwrap();
		assert_eq!(json["type"], "want");
		assert_eq!(json["teamId"], "t1");

		let done = serde_json::to_string(&WireMessage::WantDone).unwrap();
		assert_eq!(done, r#"{"type":"want_done"}"#);

		let file = WireMessage::File(FilePayload {
			team_id: "t1".into(),
			path: "a".into(),
			hash: "h".into(),
			mod_time: 5,
			data_b64: "aGk=".into(),
		});
		let json = serde_json::to_value(&file).unwrap();
		assert_eq!(json["dataB64"], "aGk=");
		assert_eq!(json["modTime"], 5);
	}

	#[test]
	fn test_decode_sync_with_missing_fields() {
		let msg: WireMessage = serde_json::from_str(r#"{"type":"sync","deviceId":"B"}"#).unwrap();
		let WireMessage::Sync(payload) = msg else { panic!("expected sync") };
		assert_eq!(payload.device_id, "B");
		assert!(payload.manifests.is_empty());
	}

	#[test]
	fn test_hello_shape() {
		let hello = HelloMessage {
			app: APP_NAME.into(),
			kind: HELLO_TYPE.into(),
			device_id: "A".into(),
			tcp_port: 4000,
			..Default::default()
		};
		let json = serde_json::to_value(&hello).unwrap();
		assert_eq!(json["type"], "hello");
		assert_eq!(json["tcpPort"], 4000);
		assert!(json.get("auth").is_none());
	}

	#[test]
	fn test_team_summaries_skip_deleted() {
		let mut doc = AppConfig::default();
		doc.teams.push(crate::model::Team { id: "t1".into(), name: "Ops".into(), ..Default::default() });
		let mut gone = crate::model::Team { id: "t2".into(), ..Default::default() };
		gone.sync.deleted = true;
		doc.teams.push(gone);

		assert_eq!(TeamSummary::of(&doc), vec![TeamSummary { id: "t1".into(), name: "Ops".into() }]);
	}
}

// vim: ts=4
