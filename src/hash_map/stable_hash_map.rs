//! StableHashMap - chained hash table with stable slot indices
//!
//! A hash map built from two flat arrays:
//! - a bucket array mapping `hash % bucket_count` to the head of a collision chain
//! - a slot array holding `{hash, next, key, value}` records, where `next` threads
//!   both the per-bucket collision chains and the free list of vacated slots
//!
//! Slots are never moved: removing an entry leaves its slot in place on the free
//! list, and growing the table only reallocates the bucket array and rebuilds the
//! chains. A slot index observed for a live entry stays valid until that entry is
//! removed or the map is cleared.
//!
//! Structural mutations bump a version counter. Borrowed iterators are safe by
//! construction; the detached [`MapCursor`] re-validates the version on every
//! step and fails with `ConcurrentModification` once the map has changed.
//!
//! # Examples
//!
//! ```rust
//! use geopin::StableHashMap;
//!
//! let mut map = StableHashMap::new();
//! map.insert("hello", 42).unwrap();
//! assert_eq!(map.get("hello"), Some(&42));
//! ```

use crate::config::MapConfig;
use crate::error::{GeopinError, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::mem;
use std::ops::Index;

/// Sentinel for "no slot": empty bucket, end of chain, end of free list
const EMPTY: u32 = u32::MAX;

/// Largest supported number of slots (`EMPTY` is reserved)
const MAX_SLOTS: usize = u32::MAX as usize;

/// Prime steps for bucket array growth
const PRIMES: &[usize] = &[
    5, 11, 23, 47, 97, 199, 409, 823, 1741, 3469, 6949, 14033, 28411, 57557, 116731, 236897,
    480881, 976369, 1982627, 4026031, 8175383, 16601593, 33712729, 68460391, 139022417, 282312799,
    573292817, 1164186217,
];

fn next_prime(n: usize) -> usize {
    for &prime in PRIMES {
        if prime >= n {
            return prime;
        }
    }
    n.next_power_of_two()
}

struct Slot<K, V> {
    /// Cached full hash of the key; stale for vacant slots
    hash: u64,
    /// Next slot in the collision chain, or next free slot for vacant ones
    next: u32,
    /// `None` marks a vacant slot parked on the free list
    data: Option<(K, V)>,
}

/// Chained hash map with stable slot indices and versioned cursors
///
/// Generic over key `K`, value `V`, and hasher builder `S` (ahash by default).
pub struct StableHashMap<K, V, S = ahash::RandomState> {
    /// Chain heads, indexed by `hash % buckets.len()`
    buckets: Vec<u32>,
    /// Entry storage; vacant slots stay allocated and join the free list
    slots: Vec<Slot<K, V>>,
    /// Head of the free list threaded through `Slot::next`
    free_head: u32,
    /// Number of vacant slots
    free_len: usize,
    /// Number of live entries
    len: usize,
    /// Live-entry count that triggers the next bucket growth
    max_load: usize,
    /// Bumped on insert of a new key, remove, clear, and rehash
    version: u64,
    config: MapConfig,
    hash_builder: S,
}

impl<K, V> StableHashMap<K, V, ahash::RandomState>
where
    K: Hash + Eq,
{
    /// Create an empty map with the default configuration and hasher
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    /// Create an empty map sized for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(MapConfig {
            initial_capacity: capacity,
            ..MapConfig::default()
        })
    }

    /// Create an empty map with a custom configuration
    pub fn with_config(config: MapConfig) -> Self {
        Self::with_config_and_hasher(config, ahash::RandomState::new())
    }
}

impl<K, V, S> StableHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Create an empty map with a custom hasher builder
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_config_and_hasher(MapConfig::default(), hash_builder)
    }

    /// Create an empty map with a custom configuration and hasher builder
    ///
    /// An `initial_capacity` of zero defers bucket allocation to the first
    /// insert. Out-of-range load factors fall back to the default.
    pub fn with_config_and_hasher(config: MapConfig, hash_builder: S) -> Self {
        let load_factor = config.effective_load_factor();
        let (buckets, max_load) = if config.initial_capacity == 0 {
            (Vec::new(), 0)
        } else {
            let count = next_prime(bucket_count_for(config.initial_capacity, load_factor));
            (vec![EMPTY; count], load_limit(count, load_factor))
        };
        Self {
            buckets,
            slots: Vec::new(),
            free_head: EMPTY,
            free_len: 0,
            len: 0,
            max_load,
            version: 0,
            config,
            hash_builder,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the map holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bucket count
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of vacant slots awaiting reuse
    pub fn vacant_slots(&self) -> usize {
        self.free_len
    }

    /// Version counter; changes exactly when a structural mutation happens
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Insert or overwrite; returns the previous value for an existing key
    ///
    /// Overwriting a value is not a structural mutation and does not invalidate
    /// cursors. Fails only when the slot index space is exhausted.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let hash = self.hash_builder.hash_one(&key);
        if let Some(idx) = self.find_index(hash, &key) {
            if let Some((_, existing)) = self.slots[idx].data.as_mut() {
                return Ok(Some(mem::replace(existing, value)));
            }
        }
        self.insert_new(hash, key, value)?;
        Ok(None)
    }

    /// Insert a new key, failing with `DuplicateKey` if it is already present
    pub fn try_insert(&mut self, key: K, value: V) -> Result<()> {
        let hash = self.hash_builder.hash_one(&key);
        if self.find_index(hash, &key).is_some() {
            return Err(GeopinError::DuplicateKey);
        }
        self.insert_new(hash, key, value)
    }

    /// Look up a value
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        let idx = self.find_index(hash, key)?;
        self.slots[idx].data.as_ref().map(|(_, v)| v)
    }

    /// Look up a value mutably
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        let idx = self.find_index(hash, key)?;
        self.slots[idx].data.as_mut().map(|(_, v)| v)
    }

    /// Check whether a key is present
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.find_index(hash, key).is_some()
    }

    /// Remove an entry, returning its value
    ///
    /// The vacated slot stays allocated and is threaded onto the free list for
    /// reuse by a later insert.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.buckets.is_empty() {
            return None;
        }
        let hash = self.hash_builder.hash_one(key);
        let bucket = (hash as usize) % self.buckets.len();
        let mut prev: Option<usize> = None;
        let mut link = self.buckets[bucket];
        while link != EMPTY {
            let i = link as usize;
            let found = match &self.slots[i].data {
                Some((k, _)) => self.slots[i].hash == hash && k.borrow() == key,
                None => false,
            };
            if found {
                let next = self.slots[i].next;
                match prev {
                    Some(p) => self.slots[p].next = next,
                    None => self.buckets[bucket] = next,
                }
                let (_, value) = self.slots[i].data.take()?;
                self.slots[i].next = self.free_head;
                self.free_head = link;
                self.free_len += 1;
                self.len -= 1;
                self.version = self.version.wrapping_add(1);
                return Some(value);
            }
            prev = Some(i);
            link = self.slots[i].next;
        }
        None
    }

    /// Drop every entry, keeping the bucket allocation
    pub fn clear(&mut self) {
        self.buckets.fill(EMPTY);
        self.slots.clear();
        self.free_head = EMPTY;
        self.free_len = 0;
        self.len = 0;
        self.version = self.version.wrapping_add(1);
    }

    /// Grow the bucket array so `additional` more entries fit without rehashing
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.len + additional;
        if needed > MAX_SLOTS {
            return Err(GeopinError::capacity_overflow(needed, MAX_SLOTS));
        }
        if needed > self.max_load {
            let load_factor = self.config.effective_load_factor();
            self.grow(bucket_count_for(needed, load_factor));
        }
        Ok(())
    }

    /// Borrowed iterator over `(&K, &V)` in slot order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.len,
        }
    }

    /// Borrowed iterator over `(&K, &mut V)`
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            slots: self.slots.iter_mut(),
            remaining: self.len,
        }
    }

    /// View over the keys
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// View over the values
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Mutable view over the values
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Detached versioned cursor, in the spirit of an enumerator that survives
    /// the borrow but not a structural mutation
    pub fn cursor(&self) -> MapCursor {
        MapCursor {
            version: self.version,
            index: 0,
        }
    }

    fn find_index<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.buckets.is_empty() {
            return None;
        }
        let mut link = self.buckets[(hash as usize) % self.buckets.len()];
        while link != EMPTY {
            let slot = &self.slots[link as usize];
            if let Some((k, _)) = &slot.data {
                if slot.hash == hash && k.borrow() == key {
                    return Some(link as usize);
                }
            }
            link = slot.next;
        }
        None
    }

    fn insert_new(&mut self, hash: u64, key: K, value: V) -> Result<()> {
        if self.buckets.is_empty() {
            let load_factor = self.config.effective_load_factor();
            self.grow(bucket_count_for(self.config.initial_capacity.max(1), load_factor));
        } else if self.len >= self.max_load {
            self.grow(self.buckets.len() + 1);
        }
        let bucket = (hash as usize) % self.buckets.len();
        let idx = match self.pop_free() {
            Some(i) => {
                self.slots[i] = Slot {
                    hash,
                    next: self.buckets[bucket],
                    data: Some((key, value)),
                };
                i
            }
            None => {
                let i = self.slots.len();
                if i >= MAX_SLOTS {
                    return Err(GeopinError::capacity_overflow(i + 1, MAX_SLOTS));
                }
                self.slots.push(Slot {
                    hash,
                    next: self.buckets[bucket],
                    data: Some((key, value)),
                });
                i
            }
        };
        self.buckets[bucket] = idx as u32;
        self.len += 1;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    fn pop_free(&mut self) -> Option<usize> {
        if self.free_head == EMPTY {
            return None;
        }
        let idx = self.free_head as usize;
        self.free_head = self.slots[idx].next;
        self.free_len -= 1;
        Some(idx)
    }

    /// Reallocate buckets to at least `min_buckets` and rebuild the chains.
    /// Slots are not moved; free-list threading through vacant slots survives.
    fn grow(&mut self, min_buckets: usize) {
        let count = next_prime(min_buckets.max(5));
        if count == self.buckets.len() {
            return;
        }
        self.buckets = vec![EMPTY; count];
        self.max_load = load_limit(count, self.config.effective_load_factor());
        for i in 0..self.slots.len() {
            if self.slots[i].data.is_some() {
                let bucket = (self.slots[i].hash as usize) % count;
                self.slots[i].next = self.buckets[bucket];
                self.buckets[bucket] = i as u32;
            }
        }
        self.version = self.version.wrapping_add(1);
    }
}

fn bucket_count_for(entries: usize, load_factor: f32) -> usize {
    ((entries as f32 / load_factor).ceil() as usize).max(5)
}

fn load_limit(bucket_count: usize, load_factor: f32) -> usize {
    ((bucket_count as f32 * load_factor) as usize).max(1)
}

impl<K, V, S> Default for StableHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_config_and_hasher(MapConfig::default(), S::default())
    }
}

impl<K, V, S> fmt::Debug for StableHashMap<K, V, S>
where
    K: Hash + Eq + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> PartialEq for StableHashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S> Eq for StableHashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S, Q> Index<&Q> for StableHashMap<K, V, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    /// Panics if the key is absent, mirroring the std map indexer contract
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K, V, S> Extend<(K, V)> for StableHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Panics if the slot index space (`u32::MAX` slots) is exhausted; the
    /// trait signature leaves no way to surface the error
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v).expect("slot index space exhausted");
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for StableHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Panics under the same condition as [`Extend::extend`]
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

/// Borrowed iterator over entries in slot order
pub struct Iter<'a, K, V> {
    slots: std::slice::Iter<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Some((k, v)) = &slot.data {
                self.remaining -= 1;
                return Some((k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> std::iter::FusedIterator for Iter<'_, K, V> {}

/// Borrowed mutable iterator over entries in slot order
pub struct IterMut<'a, K, V> {
    slots: std::slice::IterMut<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Some((k, v)) = &mut slot.data {
                self.remaining -= 1;
                return Some((&*k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> std::iter::FusedIterator for IterMut<'_, K, V> {}

/// View iterator over keys
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// View iterator over values
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// Mutable view iterator over values
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

/// Owning iterator over entries in slot order
pub struct IntoIter<K, V> {
    slots: std::vec::IntoIter<Slot<K, V>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Some((k, v)) = slot.data {
                self.remaining -= 1;
                return Some((k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V, S> IntoIterator for StableHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            slots: self.slots.into_iter(),
            remaining: self.len,
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a StableHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut StableHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Detached cursor that re-validates the map version on every step
///
/// Unlike the borrowed iterators, a cursor holds no reference to the map: it
/// can be parked across mutations of *other* state and resumed later. Stepping
/// it after a structural mutation of its map fails instead of yielding stale or
/// duplicated entries.
///
/// ```rust
/// use geopin::StableHashMap;
///
/// let mut map = StableHashMap::new();
/// map.insert(1u32, "one").unwrap();
/// let mut cursor = map.cursor();
/// assert_eq!(cursor.next(&map).unwrap(), Some((&1, &"one")));
/// map.insert(2, "two").unwrap();
/// assert!(cursor.next(&map).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MapCursor {
    version: u64,
    index: usize,
}

impl MapCursor {
    /// Advance to the next live entry, or `Ok(None)` at the end
    pub fn next<'a, K, V, S>(
        &mut self,
        map: &'a StableHashMap<K, V, S>,
    ) -> Result<Option<(&'a K, &'a V)>>
    where
        K: Hash + Eq,
        S: BuildHasher,
    {
        if self.version != map.version {
            return Err(GeopinError::ConcurrentModification);
        }
        while self.index < map.slots.len() {
            let slot = &map.slots[self.index];
            self.index += 1;
            if let Some((k, v)) = &slot.data {
                return Ok(Some((k, v)));
            }
        }
        Ok(None)
    }
}

impl<K, V, S> Serialize for StableHashMap<K, V, S>
where
    K: Hash + Eq + Serialize,
    V: Serialize,
    S: BuildHasher,
{
    fn serialize<Sz>(&self, serializer: Sz) -> std::result::Result<Sz::Ok, Sz::Error>
    where
        Sz: Serializer,
    {
        serializer.collect_map(self.iter())
    }
}

impl<'de, K, V, S> Deserialize<'de> for StableHashMap<K, V, S>
where
    K: Hash + Eq + Deserialize<'de>,
    V: Deserialize<'de>,
    S: BuildHasher + Default,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MapVisitor<K, V, S> {
            marker: PhantomData<(K, V, S)>,
        }

        impl<'de, K, V, S> Visitor<'de> for MapVisitor<K, V, S>
        where
            K: Hash + Eq + Deserialize<'de>,
            V: Deserialize<'de>,
            S: BuildHasher + Default,
        {
            type Value = StableHashMap<K, V, S>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let config = MapConfig {
                    initial_capacity: access.size_hint().unwrap_or(0),
                    ..MapConfig::default()
                };
                let mut map = StableHashMap::with_config_and_hasher(config, S::default());
                while let Some((key, value)) = access.next_entry()? {
                    map.insert(key, value).map_err(serde::de::Error::custom)?;
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor {
            marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_insert_get() {
        let mut map = StableHashMap::new();
        assert_eq!(map.insert("hello".to_string(), 42).unwrap(), None);
        assert_eq!(map.get("hello"), Some(&42));
        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());
    }

    #[test]
    fn test_overwrite_returns_old() {
        let mut map = StableHashMap::new();
        assert_eq!(map.insert("key", 1).unwrap(), None);
        assert_eq!(map.insert("key", 2).unwrap(), Some(1));
        assert_eq!(map.get("key"), Some(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_try_insert_duplicate() {
        let mut map = StableHashMap::new();
        map.try_insert("key", 1).unwrap();
        assert!(matches!(
            map.try_insert("key", 2),
            Err(GeopinError::DuplicateKey)
        ));
        assert_eq!(map.get("key"), Some(&1));
    }

    #[test]
    fn test_remove() {
        let mut map = StableHashMap::new();
        map.insert("key", 42).unwrap();
        assert_eq!(map.remove("key"), Some(42));
        assert_eq!(map.remove("key"), None);
        assert_eq!(map.get("key"), None);
        assert_eq!(map.len(), 0);
        assert_eq!(map.vacant_slots(), 1);
    }

    #[test]
    fn test_free_slot_reuse() {
        let mut map = StableHashMap::new();
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();
        map.insert(3, 30).unwrap();

        map.remove(&2);
        assert_eq!(map.vacant_slots(), 1);

        map.insert(4, 40).unwrap();
        assert_eq!(map.vacant_slots(), 0);
        assert_eq!(map.len(), 3);
        // The vacated slot was reused, not appended
        assert_eq!(map.slots.len(), 3);
    }

    #[test]
    fn test_free_list_lifo_order() {
        let mut map = StableHashMap::new();
        for i in 0..4 {
            map.insert(i, i).unwrap();
        }
        map.remove(&0);
        map.remove(&3);
        // Last freed is first reused
        map.insert(100, 100).unwrap();
        map.insert(101, 101).unwrap();
        assert_eq!(map.slots.len(), 4);
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_growth_keeps_entries() {
        let mut map = StableHashMap::with_capacity(4);
        let before = map.bucket_count();
        for i in 0..1000 {
            map.insert(i, i * 2).unwrap();
        }
        assert!(map.bucket_count() > before);
        for i in 0..1000 {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn test_zero_capacity_lazy_alloc() {
        let mut map: StableHashMap<i32, i32> = StableHashMap::with_capacity(0);
        assert_eq!(map.bucket_count(), 0);
        map.insert(1, 1).unwrap();
        assert!(map.bucket_count() > 0);
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn test_slot_indices_stable_across_growth() {
        let mut map = StableHashMap::with_capacity(4);
        map.insert("pinned".to_string(), 7).unwrap();
        // "pinned" went into slot 0; growth must not move it
        for i in 0..500 {
            map.insert(format!("k{}", i), i).unwrap();
        }
        assert!(map.slots[0]
            .data
            .as_ref()
            .is_some_and(|(k, _)| k.as_str() == "pinned"));
    }

    #[test]
    fn test_borrowed_lookup() {
        let mut map = StableHashMap::new();
        map.insert("owned".to_string(), 1).unwrap();
        // &str lookup against String keys
        assert_eq!(map.get("owned"), Some(&1));
        assert!(map.contains_key("owned"));
        assert_eq!(map.remove("owned"), Some(1));
    }

    #[test]
    fn test_index_present() {
        let mut map = StableHashMap::new();
        map.insert("present", 1).unwrap();
        assert_eq!(map["present"], 1);
    }

    #[test]
    #[should_panic(expected = "no entry found for key")]
    fn test_index_panics_on_missing() {
        let map: StableHashMap<&str, i32> = StableHashMap::new();
        let _ = map["absent"];
    }

    #[test]
    fn test_clear() {
        let mut map = StableHashMap::new();
        map.insert(1, 1).unwrap();
        map.insert(2, 2).unwrap();
        let buckets = map.bucket_count();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.vacant_slots(), 0);
        assert_eq!(map.bucket_count(), buckets);
        map.insert(3, 3).unwrap();
        assert_eq!(map.get(&3), Some(&3));
    }

    #[test]
    fn test_iteration() {
        let mut map = StableHashMap::new();
        map.insert(1, "one").unwrap();
        map.insert(2, "two").unwrap();
        map.insert(3, "three").unwrap();
        map.remove(&2);

        let mut keys: Vec<i32> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, vec![1, 3]);
        assert_eq!(map.iter().len(), 2);
        assert_eq!(map.values().count(), 2);
    }

    #[test]
    fn test_iter_mut() {
        let mut map = StableHashMap::new();
        map.insert("a", 1).unwrap();
        map.insert("b", 2).unwrap();
        for v in map.values_mut() {
            *v *= 10;
        }
        assert_eq!(map.get("a"), Some(&10));
        assert_eq!(map.get("b"), Some(&20));
    }

    #[test]
    fn test_into_iter() {
        let mut map = StableHashMap::new();
        map.insert(1, 10).unwrap();
        map.insert(2, 20).unwrap();
        map.remove(&1);
        let entries: Vec<(i32, i32)> = map.into_iter().collect();
        assert_eq!(entries, vec![(2, 20)]);
    }

    #[test]
    fn test_from_iterator_last_wins() {
        let map: StableHashMap<&str, i32> =
            [("a", 1), ("b", 2), ("a", 3)].into_iter().collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn test_version_semantics() {
        let mut map = StableHashMap::new();
        let v0 = map.version();
        map.insert(1, 1).unwrap();
        let v1 = map.version();
        assert_ne!(v0, v1);

        // Value overwrite is not structural
        map.insert(1, 2).unwrap();
        assert_eq!(map.version(), v1);

        map.remove(&1);
        assert_ne!(map.version(), v1);

        let v2 = map.version();
        map.clear();
        assert_ne!(map.version(), v2);
    }

    #[test]
    fn test_cursor_walks_all_entries() {
        let mut map = StableHashMap::new();
        for i in 0..10 {
            map.insert(i, i * i).unwrap();
        }
        let mut cursor = map.cursor();
        let mut seen = Vec::new();
        while let Some((k, v)) = cursor.next(&map).unwrap() {
            assert_eq!(*v, k * k);
            seen.push(*k);
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_cursor_invalidated_by_insert() {
        let mut map = StableHashMap::new();
        map.insert(1, 1).unwrap();
        let mut cursor = map.cursor();
        map.insert(2, 2).unwrap();
        assert!(matches!(
            cursor.next(&map),
            Err(GeopinError::ConcurrentModification)
        ));
    }

    #[test]
    fn test_cursor_invalidated_by_remove_mid_walk() {
        let mut map = StableHashMap::new();
        for i in 0..5 {
            map.insert(i, i).unwrap();
        }
        let mut cursor = map.cursor();
        assert!(cursor.next(&map).unwrap().is_some());
        map.remove(&4);
        assert!(cursor.next(&map).is_err());
    }

    #[test]
    fn test_cursor_survives_value_overwrite() {
        let mut map = StableHashMap::new();
        map.insert(1, 1).unwrap();
        map.insert(2, 2).unwrap();
        let mut cursor = map.cursor();
        assert!(cursor.next(&map).unwrap().is_some());
        map.insert(1, 100).unwrap();
        assert!(cursor.next(&map).unwrap().is_some());
        assert_eq!(cursor.next(&map).unwrap(), None);
    }

    #[test]
    fn test_reserve() {
        let mut map: StableHashMap<i32, i32> = StableHashMap::new();
        map.reserve(10_000).unwrap();
        let buckets = map.bucket_count();
        for i in 0..10_000 {
            map.insert(i, i).unwrap();
        }
        assert_eq!(map.bucket_count(), buckets);
    }

    #[test]
    fn test_map_equality() {
        let mut a = StableHashMap::new();
        let mut b = StableHashMap::new();
        a.insert(1, "x").unwrap();
        a.insert(2, "y").unwrap();
        // Different insertion order, same contents
        b.insert(2, "y").unwrap();
        b.insert(1, "x").unwrap();
        assert_eq!(a, b);
        b.remove(&1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut map = StableHashMap::new();
        map.insert("a".to_string(), 1u32).unwrap();
        map.insert("b".to_string(), 2).unwrap();
        map.remove("a");
        map.insert("c".to_string(), 3).unwrap();

        let json = serde_json::to_string(&map).unwrap();
        let back: StableHashMap<String, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
        // Vacant slots are not serialized
        assert_eq!(back.vacant_slots(), 0);
    }

    #[test]
    fn test_custom_hasher() {
        use std::collections::hash_map::RandomState;
        let mut map: StableHashMap<i32, i32, RandomState> =
            StableHashMap::with_hasher(RandomState::new());
        map.insert(1, 1).unwrap();
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn test_many_removals_then_reinserts() {
        let mut map = StableHashMap::new();
        for i in 0..1000 {
            map.insert(i, i).unwrap();
        }
        for i in 0..1000 {
            assert_eq!(map.remove(&i), Some(i));
        }
        assert!(map.is_empty());
        assert_eq!(map.vacant_slots(), 1000);
        for i in 0..1000 {
            map.insert(i, -i).unwrap();
        }
        assert_eq!(map.vacant_slots(), 0);
        assert_eq!(map.slots.len(), 1000);
        for i in 0..1000 {
            assert_eq!(map.get(&i), Some(&-i));
        }
    }
}
