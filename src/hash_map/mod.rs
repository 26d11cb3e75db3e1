//! Hash map with stable slot indices and versioned cursors
//!
//! [`StableHashMap`] is the storage primitive under both the pending-request
//! tables and the anchor vault: a chained hash table whose entries never move
//! once inserted, with a free list recycling vacated slots and a version
//! counter that lets detached cursors detect structural mutation.

mod stable_hash_map;

pub use stable_hash_map::{
    IntoIter, Iter, IterMut, Keys, MapCursor, StableHashMap, Values, ValuesMut,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let mut map: StableHashMap<u32, String> = StableHashMap::new();
        map.insert(7, "seven".to_string()).unwrap();

        let _cursor: MapCursor = map.cursor();
        let keys: Vec<u32> = map.keys().copied().collect();
        assert_eq!(keys, vec![7]);
    }
}
