//! Terrain-anchor persistence: identifiers, request records, pending-request
//! tracking, the vault datastore, and the async service front-end.
//!
//! The flow: a client issues a save/load/erase, the request is parked in a
//! [`PendingRequests`] table keyed by [`SerializableGuid`], the backend
//! executes it, and the entry is removed as its [`CompletionSource`] resolves.

mod guid;
mod pending;
mod requests;
mod service;
mod vault;

pub use guid::SerializableGuid;
pub use pending::{PendingCounts, PendingRequests};
pub use requests::{
    AnchorRecord, CompletionHandle, CompletionSource, EraseOutcome, EraseRequest,
    IncrementalResults, IncrementalSink, LoadOutcome, LoadRequest, Pose, SaveOutcome, SaveRequest,
};
pub use service::{AnchorClient, AnchorService};
pub use vault::{AnchorBackend, AnchorVault};
