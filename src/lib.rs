//! # TeamSync - LAN Peer-to-Peer Team Configuration Sync
//!
//! TeamSync replicates the team-scoped part of an application configuration
//! document (teams, shared scripts, shared networks and hosts) and a
//! per-team file tree between installations on the same local network, with
//! no server in between. Edits are tracked with per-device version vectors;
//! concurrent edits are kept side by side and flagged instead of being lost.
//!
//! ## Running a peer
//!
//! ```rust,ignore
//! use teamsync::{document, Config, SyncService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = document::load_or_create("team.json".as_ref())?;
//!     let service = SyncService::start(doc, Config::load(None)?).await?;
//!     service.set_on_merged(|doc| {
//!         let _ = document::save("team.json".as_ref(), doc);
//!     });
//!     tokio::signal::ctrl_c().await?;
//!     service.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Merging without the network
//!
//! ```rust,ignore
//! use teamsync::merge::{apply_local_edits, merge_remote};
//!
//! let (mine, _) = apply_local_edits(&saved, edited);
//! let (merged, changed) = merge_remote(&mine, &peer_view);
//! ```

pub mod callbacks;
pub mod config;
pub mod discovery;
pub mod document;
pub mod error;
pub mod exclusion;
pub mod logging;
pub mod manifest;
pub mod merge;
pub mod model;
pub mod protocol;
pub mod service;
pub mod session;
pub mod store;
pub mod version;

// Re-export commonly used types and functions
pub use callbacks::{CallbackBuilder, NoCallbacks, SyncCallbacks};
pub use config::Config;
pub use discovery::{PeerInfo, PresenceSnapshot};
pub use error::{DocumentError, ProtocolError, SyncError};
pub use merge::{apply_local_edits, merge_remote};
pub use model::AppConfig;
pub use service::SyncService;
pub use session::{SessionReport, SyncEngine};
pub use version::{compare_version, VersionOrder};

// vim: ts=4
