//! # Geopin: Terrain-Anchor Persistence
//!
//! Geopin tracks asynchronous save/load/erase operations against a store of
//! terrain anchors, keyed by 128-bit stable identifiers.
//!
//! ## Key Pieces
//!
//! - **StableHashMap**: chained hash table with stable slot indices, a free
//!   list for vacated slots, and versioned cursors that detect structural
//!   mutation mid-walk
//! - **Pending-request tables**: one map per request kind correlating request
//!   ids with in-flight completions
//! - **Anchor vault**: in-process datastore with bincode snapshot persistence
//! - **Anchor service**: tokio task owning the backend and the tables, driven
//!   through a cloneable client
//! - **Terrain tiles**: tile-grid coordinates and a per-tile payload index
//!
//! ## Quick Start
//!
//! ```rust
//! use geopin::{AnchorRecord, AnchorService, AnchorVault, Pose, SerializableGuid, ServiceConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> geopin::Result<()> {
//! let (client, service) = AnchorService::spawn(AnchorVault::new(), ServiceConfig::default())?;
//!
//! let id = SerializableGuid::random();
//! let saved = client
//!     .save_anchors(vec![AnchorRecord::new(id, Pose::IDENTITY)])
//!     .await?;
//! assert_eq!(saved.saved, vec![id]);
//!
//! let loaded = client.load_anchors(vec![id]).await?;
//! assert_eq!(loaded.anchors.len(), 1);
//!
//! client.shutdown().await;
//! service.join().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod anchor;
pub mod config;
pub mod error;
pub mod hash_map;
pub mod terrain;

pub use anchor::{
    AnchorBackend, AnchorClient, AnchorRecord, AnchorService, AnchorVault, CompletionHandle,
    CompletionSource, EraseOutcome, EraseRequest, IncrementalResults, IncrementalSink,
    LoadOutcome, LoadRequest, PendingCounts, PendingRequests, Pose, SaveOutcome, SaveRequest,
    SerializableGuid,
};
pub use config::{MapConfig, ServiceConfig};
pub use error::{GeopinError, Result};
pub use hash_map::{MapCursor, StableHashMap};
pub use terrain::{TerrainTileCoord, TileIndex};
