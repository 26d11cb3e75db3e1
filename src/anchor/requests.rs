//! Request and completion primitives for the anchor persistence API
//!
//! Every save/load/erase operation is represented by a pending-request record
//! pairing a [`CompletionSource`] (the producer half of a oneshot) with the
//! operation's payload. Load operations may additionally carry an
//! [`IncrementalSink`] that streams records to the caller as the backend finds
//! them, ahead of the final batched outcome.

use crate::anchor::guid::SerializableGuid;
use crate::error::{GeopinError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Position and orientation of an anchor in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World-space position (x, y, z)
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
}

impl Pose {
    /// Identity pose at the origin
    pub const IDENTITY: Pose = Pose {
        position: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };
}

/// A persisted anchor: stable id plus its pose
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Stable identifier
    pub id: SerializableGuid,
    /// World-space pose
    pub pose: Pose,
}

impl AnchorRecord {
    /// Build a record
    pub fn new(id: SerializableGuid, pose: Pose) -> Self {
        Self { id, pose }
    }
}

/// Result of a completed save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Ids that were persisted
    pub saved: Vec<SerializableGuid>,
}

/// Result of a completed load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// Records found; requested ids with no stored anchor are simply absent
    pub anchors: Vec<AnchorRecord>,
}

/// Result of a completed erase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseOutcome {
    /// Number of anchors actually removed
    pub erased: usize,
}

/// Producer half of a request completion
///
/// Resolving consumes the source; dropping it unresolved surfaces as
/// [`GeopinError::RequestDropped`] on the consumer side.
pub struct CompletionSource<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> CompletionSource<T> {
    /// Create a linked source/handle pair
    pub fn channel() -> (CompletionSource<T>, CompletionHandle<T>) {
        let (tx, rx) = oneshot::channel();
        (CompletionSource { tx }, CompletionHandle { rx })
    }

    /// Resolve the request; a consumer that already went away is not an error
    pub fn resolve(self, result: Result<T>) {
        let _ = self.tx.send(result);
    }
}

impl<T> fmt::Debug for CompletionSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSource").finish_non_exhaustive()
    }
}

/// Consumer half of a request completion; awaits the outcome
pub struct CompletionHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for CompletionHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(GeopinError::RequestDropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle").finish_non_exhaustive()
    }
}

/// Injected sink for streaming load results ahead of the final outcome
#[derive(Debug, Clone)]
pub struct IncrementalSink {
    tx: mpsc::UnboundedSender<AnchorRecord>,
}

impl IncrementalSink {
    /// Create a linked sink/stream pair
    pub fn channel() -> (IncrementalSink, IncrementalResults) {
        let (tx, rx) = mpsc::unbounded_channel();
        (IncrementalSink { tx }, IncrementalResults { rx })
    }

    /// Push one record; a consumer that stopped listening is ignored
    pub fn push(&self, record: AnchorRecord) {
        let _ = self.tx.send(record);
    }
}

/// Consumer side of the incremental load stream
#[derive(Debug)]
pub struct IncrementalResults {
    rx: mpsc::UnboundedReceiver<AnchorRecord>,
}

impl IncrementalResults {
    /// Receive the next streamed record; `None` once the producer is done
    pub async fn recv(&mut self) -> Option<AnchorRecord> {
        self.rx.recv().await
    }

    /// Drain whatever has been streamed so far without waiting
    pub fn drain_available(&mut self) -> Vec<AnchorRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            records.push(record);
        }
        records
    }
}

/// In-flight save: completion plus the batch of anchors to persist
#[derive(Debug)]
pub struct SaveRequest {
    /// Resolved when the backend finishes
    pub completion: CompletionSource<SaveOutcome>,
    /// Anchors to persist
    pub anchors: Vec<AnchorRecord>,
}

/// In-flight load: completion, the ids to fetch, and an optional streaming sink
#[derive(Debug)]
pub struct LoadRequest {
    /// Resolved when the backend finishes
    pub completion: CompletionSource<LoadOutcome>,
    /// Ids to fetch
    pub anchor_ids: Vec<SerializableGuid>,
    /// Streams records to the caller as the backend finds them
    pub incremental: Option<IncrementalSink>,
}

/// In-flight erase: completion plus the ids to remove
#[derive(Debug)]
pub struct EraseRequest {
    /// Resolved when the backend finishes
    pub completion: CompletionSource<EraseOutcome>,
    /// Ids to remove
    pub anchor_ids: Vec<SerializableGuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_resolves() {
        let (source, handle) = CompletionSource::channel();
        source.resolve(Ok(EraseOutcome { erased: 3 }));
        assert_eq!(handle.await.unwrap(), EraseOutcome { erased: 3 });
    }

    #[tokio::test]
    async fn test_completion_propagates_error() {
        let (source, handle) = CompletionSource::<SaveOutcome>::channel();
        source.resolve(Err(GeopinError::service_stopped("test")));
        assert!(matches!(
            handle.await,
            Err(GeopinError::ServiceStopped { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_source_surfaces() {
        let (source, handle) = CompletionSource::<SaveOutcome>::channel();
        drop(source);
        assert!(matches!(handle.await, Err(GeopinError::RequestDropped)));
    }

    #[tokio::test]
    async fn test_incremental_stream() {
        let (sink, mut results) = IncrementalSink::channel();
        let record = AnchorRecord::new(SerializableGuid::new(1, 2), Pose::IDENTITY);
        sink.push(record);
        sink.push(record);
        drop(sink);

        assert_eq!(results.recv().await, Some(record));
        assert_eq!(results.recv().await, Some(record));
        assert_eq!(results.recv().await, None);
    }

    #[tokio::test]
    async fn test_sink_ignores_gone_consumer() {
        let (sink, results) = IncrementalSink::channel();
        drop(results);
        // Must not panic or error
        sink.push(AnchorRecord::new(SerializableGuid::nil(), Pose::IDENTITY));
    }

    #[test]
    fn test_drain_available() {
        let (sink, mut results) = IncrementalSink::channel();
        sink.push(AnchorRecord::new(SerializableGuid::new(1, 0), Pose::IDENTITY));
        sink.push(AnchorRecord::new(SerializableGuid::new(2, 0), Pose::IDENTITY));
        let drained = results.drain_available();
        assert_eq!(drained.len(), 2);
        assert!(results.drain_available().is_empty());
    }
}
