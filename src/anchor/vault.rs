//! Anchor vault: the datastore persistence requests run against
//!
//! [`AnchorBackend`] abstracts the device store; [`AnchorVault`] is the
//! in-process implementation over a [`StableHashMap`], with bincode snapshots
//! for durability.

use crate::anchor::guid::SerializableGuid;
use crate::anchor::requests::{
    AnchorRecord, EraseOutcome, IncrementalSink, LoadOutcome, SaveOutcome,
};
use crate::error::{GeopinError, Result};
use crate::hash_map::StableHashMap;
use std::future::Future;
use std::io::{Read, Write};

/// Magic bytes at the head of a vault snapshot
const SNAPSHOT_MAGIC: [u8; 4] = *b"GPVT";
/// Snapshot format version
const SNAPSHOT_VERSION: u16 = 1;

/// A datastore that save/load/erase requests execute against
///
/// Implementations may talk to a device store, a remote service, or (for the
/// in-process case) [`AnchorVault`]. Futures must be `Send` so the service
/// loop can run on a multithreaded runtime.
pub trait AnchorBackend {
    /// Persist a batch of anchors, upserting by id
    fn save(
        &mut self,
        anchors: Vec<AnchorRecord>,
    ) -> impl Future<Output = Result<SaveOutcome>> + Send;

    /// Fetch the requested ids; unknown ids are skipped, and each record found
    /// is pushed to `sink` (when given) before the batched outcome returns
    fn load(
        &mut self,
        anchor_ids: &[SerializableGuid],
        sink: Option<&IncrementalSink>,
    ) -> impl Future<Output = Result<LoadOutcome>> + Send;

    /// Remove the requested ids, counting only those actually present
    fn erase(
        &mut self,
        anchor_ids: &[SerializableGuid],
    ) -> impl Future<Output = Result<EraseOutcome>> + Send;
}

/// In-process anchor datastore
#[derive(Debug, Default)]
pub struct AnchorVault {
    anchors: StableHashMap<SerializableGuid, AnchorRecord>,
}

impl AnchorVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored anchors
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Check whether the vault is empty
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Look up a stored anchor
    pub fn get(&self, id: SerializableGuid) -> Option<&AnchorRecord> {
        self.anchors.get(&id)
    }

    /// Check whether an anchor is stored
    pub fn contains(&self, id: SerializableGuid) -> bool {
        self.anchors.contains_key(&id)
    }

    /// Iterate over the stored anchors
    pub fn iter(&self) -> impl Iterator<Item = &AnchorRecord> {
        self.anchors.values()
    }

    /// Write a snapshot: magic, format version, then the bincode-encoded map
    pub fn to_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, &self.anchors)
            .map_err(|e| GeopinError::invalid_data(format!("snapshot encode failed: {}", e)))?;
        Ok(())
    }

    /// Read a snapshot written by [`to_writer`](Self::to_writer)
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(GeopinError::invalid_data("not a vault snapshot"));
        }
        let mut version = [0u8; 2];
        reader.read_exact(&mut version)?;
        let version = u16::from_le_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(GeopinError::invalid_data(format!(
                "unsupported snapshot version {}",
                version
            )));
        }
        let anchors = bincode::deserialize_from(&mut reader)
            .map_err(|e| GeopinError::invalid_data(format!("snapshot decode failed: {}", e)))?;
        Ok(Self { anchors })
    }
}

impl AnchorBackend for AnchorVault {
    async fn save(&mut self, anchors: Vec<AnchorRecord>) -> Result<SaveOutcome> {
        let mut saved = Vec::with_capacity(anchors.len());
        for record in anchors {
            self.anchors.insert(record.id, record)?;
            saved.push(record.id);
        }
        log::debug!("vault saved {} anchors, {} stored", saved.len(), self.len());
        Ok(SaveOutcome { saved })
    }

    async fn load(
        &mut self,
        anchor_ids: &[SerializableGuid],
        sink: Option<&IncrementalSink>,
    ) -> Result<LoadOutcome> {
        let mut anchors = Vec::new();
        for id in anchor_ids {
            if let Some(record) = self.anchors.get(id) {
                if let Some(sink) = sink {
                    sink.push(*record);
                }
                anchors.push(*record);
            }
        }
        log::debug!("vault load hit {}/{} ids", anchors.len(), anchor_ids.len());
        Ok(LoadOutcome { anchors })
    }

    async fn erase(&mut self, anchor_ids: &[SerializableGuid]) -> Result<EraseOutcome> {
        let mut erased = 0;
        for id in anchor_ids {
            if self.anchors.remove(id).is_some() {
                erased += 1;
            }
        }
        log::debug!("vault erased {}/{} ids", erased, anchor_ids.len());
        Ok(EraseOutcome { erased })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::requests::Pose;

    fn record(low: u64) -> AnchorRecord {
        AnchorRecord::new(
            SerializableGuid::new(low, 0xfeed),
            Pose {
                position: [low as f32, 0.0, -1.0],
                rotation: [0.0, 0.0, 0.0, 1.0],
            },
        )
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let mut vault = AnchorVault::new();
        let outcome = vault.save(vec![record(1), record(2)]).await.unwrap();
        assert_eq!(outcome.saved.len(), 2);
        assert_eq!(vault.len(), 2);

        let loaded = vault
            .load(&[record(2).id, record(1).id], None)
            .await
            .unwrap();
        assert_eq!(loaded.anchors, vec![record(2), record(1)]);
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let mut vault = AnchorVault::new();
        vault.save(vec![record(1)]).await.unwrap();
        let moved = AnchorRecord::new(record(1).id, Pose {
            position: [9.0, 9.0, 9.0],
            rotation: Pose::IDENTITY.rotation,
        });
        vault.save(vec![moved]).await.unwrap();
        assert_eq!(vault.len(), 1);
        assert_eq!(vault.get(record(1).id), Some(&moved));
    }

    #[tokio::test]
    async fn test_load_skips_unknown_ids() {
        let mut vault = AnchorVault::new();
        vault.save(vec![record(1)]).await.unwrap();
        let loaded = vault
            .load(&[record(1).id, SerializableGuid::new(99, 99)], None)
            .await
            .unwrap();
        assert_eq!(loaded.anchors, vec![record(1)]);
    }

    #[tokio::test]
    async fn test_load_streams_to_sink() {
        let mut vault = AnchorVault::new();
        vault.save(vec![record(1), record(2)]).await.unwrap();

        let (sink, mut results) = IncrementalSink::channel();
        let loaded = vault
            .load(&[record(1).id, record(2).id], Some(&sink))
            .await
            .unwrap();
        drop(sink);

        assert_eq!(results.recv().await, Some(record(1)));
        assert_eq!(results.recv().await, Some(record(2)));
        assert_eq!(results.recv().await, None);
        assert_eq!(loaded.anchors.len(), 2);
    }

    #[tokio::test]
    async fn test_erase_counts_only_present() {
        let mut vault = AnchorVault::new();
        vault.save(vec![record(1), record(2)]).await.unwrap();
        let outcome = vault
            .erase(&[record(1).id, SerializableGuid::new(42, 42)])
            .await
            .unwrap();
        assert_eq!(outcome.erased, 1);
        assert_eq!(vault.len(), 1);
        assert!(!vault.contains(record(1).id));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let mut vault = AnchorVault::new();
        vault
            .save(vec![record(1), record(2), record(3)])
            .await
            .unwrap();
        vault.erase(&[record(2).id]).await.unwrap();

        let mut buf = Vec::new();
        vault.to_writer(&mut buf).unwrap();
        let restored = AnchorVault::from_reader(buf.as_slice()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(record(1).id), Some(&record(1)));
        assert!(!restored.contains(record(2).id));
    }

    #[test]
    fn test_snapshot_rejects_bad_magic() {
        let err = AnchorVault::from_reader(&b"NOPE\x01\x00"[..]).unwrap_err();
        assert!(matches!(err, GeopinError::InvalidData { .. }));
    }

    #[test]
    fn test_snapshot_rejects_wrong_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&9u16.to_le_bytes());
        let err = AnchorVault::from_reader(buf.as_slice()).unwrap_err();
        assert!(matches!(err, GeopinError::InvalidData { .. }));
    }

    #[test]
    fn test_snapshot_truncated() {
        let err = AnchorVault::from_reader(&b"GP"[..]).unwrap_err();
        assert!(matches!(err, GeopinError::Io(_)));
    }
}
