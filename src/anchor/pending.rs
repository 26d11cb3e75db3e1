//! Pending-request tables
//!
//! One table per request kind, all keyed by [`SerializableGuid`]: an entry is
//! inserted when an operation is issued and removed exactly once when it
//! resolves. Nothing survives resolution.

use crate::anchor::guid::SerializableGuid;
use crate::anchor::requests::{
    AnchorRecord, CompletionHandle, CompletionSource, EraseOutcome, EraseRequest,
    IncrementalResults, IncrementalSink, LoadOutcome, LoadRequest, SaveOutcome, SaveRequest,
};
use crate::config::MapConfig;
use crate::error::{GeopinError, Result};
use crate::hash_map::StableHashMap;

/// Number of in-flight requests per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCounts {
    /// In-flight saves
    pub saves: usize,
    /// In-flight loads
    pub loads: usize,
    /// In-flight erases
    pub erases: usize,
}

impl PendingCounts {
    /// Total in-flight requests
    pub fn total(&self) -> usize {
        self.saves + self.loads + self.erases
    }
}

/// Tracks every in-flight save, load and erase by request id
#[derive(Debug, Default)]
pub struct PendingRequests {
    saves: StableHashMap<SerializableGuid, SaveRequest>,
    loads: StableHashMap<SerializableGuid, LoadRequest>,
    erases: StableHashMap<SerializableGuid, EraseRequest>,
}

impl PendingRequests {
    /// Create empty tables with default sizing
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    /// Create empty tables with the given map configuration
    pub fn with_config(config: MapConfig) -> Self {
        Self {
            saves: StableHashMap::with_config(config.clone()),
            loads: StableHashMap::with_config(config.clone()),
            erases: StableHashMap::with_config(config),
        }
    }

    /// Issue a save: allocates a request id, parks the request, hands back the
    /// handle the caller awaits
    pub fn begin_save(
        &mut self,
        anchors: Vec<AnchorRecord>,
    ) -> Result<(SerializableGuid, CompletionHandle<SaveOutcome>)> {
        let (completion, handle) = CompletionSource::channel();
        let id = self.register_save(SaveRequest { completion, anchors })?;
        Ok((id, handle))
    }

    /// Park an already-built save request under a fresh id
    pub fn register_save(&mut self, request: SaveRequest) -> Result<SerializableGuid> {
        let id = self.fresh_id();
        self.saves.try_insert(id, request)?;
        Ok(id)
    }

    /// Park an already-built load request under a fresh id
    pub fn register_load(&mut self, request: LoadRequest) -> Result<SerializableGuid> {
        let id = self.fresh_id();
        self.loads.try_insert(id, request)?;
        Ok(id)
    }

    /// Park an already-built erase request under a fresh id
    pub fn register_erase(&mut self, request: EraseRequest) -> Result<SerializableGuid> {
        let id = self.fresh_id();
        self.erases.try_insert(id, request)?;
        Ok(id)
    }

    /// Issue a load; `incremental` additionally opens a streaming channel
    pub fn begin_load(
        &mut self,
        anchor_ids: Vec<SerializableGuid>,
        incremental: bool,
    ) -> Result<(
        SerializableGuid,
        CompletionHandle<LoadOutcome>,
        Option<IncrementalResults>,
    )> {
        let (completion, handle) = CompletionSource::channel();
        let (sink, results) = if incremental {
            let (sink, results) = IncrementalSink::channel();
            (Some(sink), Some(results))
        } else {
            (None, None)
        };
        let id = self.register_load(LoadRequest {
            completion,
            anchor_ids,
            incremental: sink,
        })?;
        Ok((id, handle, results))
    }

    /// Issue an erase
    pub fn begin_erase(
        &mut self,
        anchor_ids: Vec<SerializableGuid>,
    ) -> Result<(SerializableGuid, CompletionHandle<EraseOutcome>)> {
        let (completion, handle) = CompletionSource::channel();
        let id = self.register_erase(EraseRequest {
            completion,
            anchor_ids,
        })?;
        Ok((id, handle))
    }

    /// Remove a pending save and hand it to the caller (worker path)
    pub fn take_save(&mut self, id: SerializableGuid) -> Result<SaveRequest> {
        self.saves
            .remove(&id)
            .ok_or_else(|| GeopinError::request_not_found(id.to_string()))
    }

    /// Remove a pending load and hand it to the caller
    pub fn take_load(&mut self, id: SerializableGuid) -> Result<LoadRequest> {
        self.loads
            .remove(&id)
            .ok_or_else(|| GeopinError::request_not_found(id.to_string()))
    }

    /// Remove a pending erase and hand it to the caller
    pub fn take_erase(&mut self, id: SerializableGuid) -> Result<EraseRequest> {
        self.erases
            .remove(&id)
            .ok_or_else(|| GeopinError::request_not_found(id.to_string()))
    }

    /// Resolve a pending save and remove it
    pub fn complete_save(&mut self, id: SerializableGuid, result: Result<SaveOutcome>) -> Result<()> {
        let request = self.take_save(id)?;
        request.completion.resolve(result);
        Ok(())
    }

    /// Resolve a pending load and remove it
    pub fn complete_load(&mut self, id: SerializableGuid, result: Result<LoadOutcome>) -> Result<()> {
        let request = self.take_load(id)?;
        request.completion.resolve(result);
        Ok(())
    }

    /// Resolve a pending erase and remove it
    pub fn complete_erase(
        &mut self,
        id: SerializableGuid,
        result: Result<EraseOutcome>,
    ) -> Result<()> {
        let request = self.take_erase(id)?;
        request.completion.resolve(result);
        Ok(())
    }

    /// Drain every table, resolving each request with `ServiceStopped(reason)`
    pub fn abort_all(&mut self, reason: &str) {
        let count = self.counts().total();
        if count > 0 {
            log::debug!("aborting {} pending requests: {}", count, reason);
        }
        for (_, request) in std::mem::take(&mut self.saves) {
            request
                .completion
                .resolve(Err(GeopinError::service_stopped(reason)));
        }
        for (_, request) in std::mem::take(&mut self.loads) {
            request
                .completion
                .resolve(Err(GeopinError::service_stopped(reason)));
        }
        for (_, request) in std::mem::take(&mut self.erases) {
            request
                .completion
                .resolve(Err(GeopinError::service_stopped(reason)));
        }
    }

    /// Per-kind in-flight counts
    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            saves: self.saves.len(),
            loads: self.loads.len(),
            erases: self.erases.len(),
        }
    }

    /// Check whether an id is pending in any table
    pub fn is_pending(&self, id: SerializableGuid) -> bool {
        self.saves.contains_key(&id)
            || self.loads.contains_key(&id)
            || self.erases.contains_key(&id)
    }

    // Random ids collide with astronomically small probability; the loop is
    // for correctness, not an expected path.
    fn fresh_id(&self) -> SerializableGuid {
        loop {
            let id = SerializableGuid::random();
            if !id.is_nil() && !self.is_pending(id) {
                return id;
            }
        }
    }
}
