//! Slab-class storage engine (component C3): variable-sized items, a
//! chained hash index, per-class LRU, and configurable eviction.

use rand::Rng;

use crate::error::{EngineError, EngineResult};
use crate::item::{CasGenerator, Item, EXPIRE_NEVER};

use super::class::SlabClassTable;
use super::index::HashIndex;
use super::policy::SlabEvictPolicy;
use super::pool::{ItemId, SlabPool};

/// Per-item bookkeeping budgeted out of each chunk, standing in for the
/// flags/expiry/cas/length/linkage header a byte-exact port would pack
/// inline alongside the value.
pub const CHUNK_HEADER_BYTES: usize = 48;

/// How many items an `ExpiredFirst` sweep inspects before giving up and
/// falling back to plain LRU.
const EXPIRED_SCAN_SAMPLE: usize = 8;

#[derive(Debug, Clone)]
pub struct SlabConfig {
    pub min_chunk: usize,
    pub max_chunk: usize,
    pub growth_factor: f64,
    pub slab_size: usize,
    pub mem_limit: usize,
    pub nbucket: usize,
    pub evict_policy: SlabEvictPolicy,
    pub use_freeq: bool,
    pub use_cas: bool,
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            min_chunk: 96,
            max_chunk: 1024 * 1024,
            growth_factor: 1.25,
            slab_size: 1024 * 1024,
            mem_limit: 64 * 1024 * 1024,
            nbucket: 1024,
            evict_policy: SlabEvictPolicy::Lru,
            use_freeq: true,
            use_cas: true,
        }
    }
}

pub struct SlabEngine {
    config: SlabConfig,
    pool: SlabPool,
    index: HashIndex,
    cas_gen: CasGenerator,
}

impl SlabEngine {
    pub fn new(config: SlabConfig) -> Self {
        let classes = SlabClassTable::new(
            config.min_chunk,
            config.max_chunk,
            config.growth_factor,
            config.slab_size,
        );
        let pool = SlabPool::with_freeq(classes, config.slab_size, config.mem_limit, config.use_freeq);
        let index = HashIndex::new(config.nbucket);
        Self {
            config,
            pool,
            index,
            cas_gen: CasGenerator::new(),
        }
    }

    pub fn config(&self) -> &SlabConfig {
        &self.config
    }

    pub fn live_count(&self) -> usize {
        self.pool.live_count()
    }

    fn class_for(&self, key_len: usize, value_len: usize) -> EngineResult<usize> {
        self.pool
            .classes()
            .class_for(key_len + value_len + CHUNK_HEADER_BYTES)
            .ok_or(EngineError::Oversized)
    }

    fn find_live(&self, key: &[u8], now: u32) -> Option<ItemId> {
        let id = self.index.find(&self.pool, key)?;
        if self.pool.item(id).is_expired(now) {
            None
        } else {
            Some(id)
        }
    }

    /// Unlink and free an item by id, wherever it is logically found.
    fn evict_id(&mut self, id: ItemId) {
        let key = self.pool.item(id).key().to_vec();
        self.index.remove(&mut self.pool, &key);
        self.pool.lru_unlink(id);
        self.pool.free(id);
    }

    /// Attempt to reclaim exactly one chunk suitable for `class`, per the
    /// configured eviction policy. Returns whether progress was made.
    fn evict_one(&mut self, class: usize, now: u32) -> bool {
        match self.config.evict_policy {
            SlabEvictPolicy::None => false,
            SlabEvictPolicy::Random => {
                let occupied: Vec<usize> = (0..self.pool.classes().len())
                    .filter(|&c| self.pool.lru_tail(c).is_some())
                    .collect();
                let victim_class = if occupied.is_empty() {
                    None
                } else {
                    let idx = rand::thread_rng().gen_range(0..occupied.len());
                    Some(occupied[idx])
                };
                match victim_class.and_then(|c| self.pool.lru_tail(c)) {
                    Some(id) => {
                        self.evict_id(id);
                        true
                    }
                    None => false,
                }
            }
            SlabEvictPolicy::Lru => match self.pool.lru_tail(class) {
                Some(id) => {
                    self.evict_id(id);
                    true
                }
                None => false,
            },
            SlabEvictPolicy::ExpiredFirst => {
                let expired = self
                    .pool
                    .lru_iter(class)
                    .take(EXPIRED_SCAN_SAMPLE)
                    .find(|&id| self.pool.item(id).is_expired(now));
                match expired.or_else(|| self.pool.lru_tail(class)) {
                    Some(id) => {
                        self.evict_id(id);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Allocate storage for `item` in `class`, evicting under the
    /// configured policy until the budget yields a chunk or no further
    /// progress is possible.
    fn allocate(&mut self, class: usize, mut item: Item, now: u32) -> EngineResult<ItemId> {
        loop {
            match self.pool.alloc(class, item) {
                Ok(id) => return Ok(id),
                Err(returned) => {
                    item = returned;
                    if !self.evict_one(class, now) {
                        return Err(EngineError::NoMem);
                    }
                }
            }
        }
    }

    fn store_new(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        let class = self.class_for(key.len(), value.len())?;
        let cas = self.cas_gen.next();
        let item = Item::new(key.to_vec(), value, flags, expiry, cas);
        let id = self.allocate(class, item, now)?;
        self.index.insert(&mut self.pool, id);
        self.pool.lru_push_head(id);
        Ok(())
    }

    pub fn get(&mut self, key: &[u8], now: u32) -> Option<&Item> {
        let id = self.find_live(key, now)?;
        self.pool.lru_touch(id);
        Some(self.pool.item(id))
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        if let Some(id) = self.find_live(key, now) {
            self.evict_id(id);
        }
        self.store_new(key, value, flags, expiry, now)
    }

    pub fn add(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        if self.find_live(key, now).is_some() {
            return Err(EngineError::NotStored);
        }
        self.store_new(key, value, flags, expiry, now)
    }

    pub fn replace(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        let id = self.find_live(key, now).ok_or(EngineError::NotStored)?;
        self.evict_id(id);
        self.store_new(key, value, flags, expiry, now)
    }

    pub fn cas(
        &mut self,
        key: &[u8],
        value: Vec<u8>,
        flags: u32,
        expiry: u32,
        expected_cas: u64,
        now: u32,
    ) -> EngineResult<()> {
        let id = self.find_live(key, now).ok_or(EngineError::NotFound)?;
        if self.config.use_cas && self.pool.item(id).cas() != expected_cas {
            return Err(EngineError::Exists);
        }
        self.evict_id(id);
        self.store_new(key, value, flags, expiry, now)
    }

    pub fn append(&mut self, key: &[u8], tail: &[u8], now: u32, prepend: bool) -> EngineResult<()> {
        let id = self.find_live(key, now).ok_or(EngineError::NotStored)?;
        let (flags, expiry, mut new_value) = {
            let it = self.pool.item(id);
            (it.flags(), it.expiry(), Vec::with_capacity(it.value().len() + tail.len()))
        };
        {
            let it = self.pool.item(id);
            if prepend {
                new_value.extend_from_slice(tail);
                new_value.extend_from_slice(it.value());
            } else {
                new_value.extend_from_slice(it.value());
                new_value.extend_from_slice(tail);
            }
        }
        self.evict_id(id);
        self.store_new(key, new_value, flags, expiry, now)
            .map_err(|_| EngineError::NotStored)
    }

    pub fn delete(&mut self, key: &[u8], now: u32) -> bool {
        match self.find_live(key, now) {
            Some(id) => {
                self.evict_id(id);
                true
            }
            None => false,
        }
    }

    pub fn arith(&mut self, key: &[u8], delta: u64, now: u32, decr: bool) -> EngineResult<u64> {
        let id = self.find_live(key, now).ok_or(EngineError::NotFound)?;
        let cas = self.cas_gen.next();
        let it = self.pool.item_mut(id);
        if decr {
            it.decr(delta, cas)
        } else {
            it.incr(delta, cas)
        }
    }

    /// Unconditionally drop every live item (admin `flush_all`).
    pub fn flush_all(&mut self) {
        let ids: Vec<ItemId> = (0..self.pool.classes().len())
            .flat_map(|c| self.pool.lru_iter(c).collect::<Vec<_>>())
            .collect();
        for id in ids {
            self.evict_id(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_engine(evict: SlabEvictPolicy) -> SlabEngine {
        SlabEngine::new(SlabConfig {
            min_chunk: 64,
            max_chunk: 256,
            growth_factor: 1.25,
            slab_size: 256, // one chunk per slab at min_chunk, forces tight eviction
            mem_limit: 256 * 3,
            nbucket: 16,
            evict_policy: evict,
            use_freeq: true,
            use_cas: true,
        })
    }

    #[test]
    fn seed_scenario_3_set_get_delete() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        e.set(b"foo", b"bar".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert_eq!(e.get(b"foo", 0).unwrap().value(), b"bar");
        assert!(e.delete(b"foo", 0));
        assert!(e.get(b"foo", 0).is_none());
    }

    #[test]
    fn seed_scenario_4_cas_sequence() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        e.set(b"k", b"a".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        let c1 = e.get(b"k", 0).unwrap().cas();
        assert!(e.cas(b"k", b"b".to_vec(), 0, EXPIRE_NEVER, c1, 0).is_ok());
        let c2 = e.get(b"k", 0).unwrap().cas();
        assert_ne!(c1, c2);
        let result = e.cas(b"k", b"c".to_vec(), 0, EXPIRE_NEVER, c1, 0);
        assert_eq!(result, Err(EngineError::Exists));
    }

    #[test]
    fn add_refuses_when_present() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        e.add(b"k", b"v1".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert_eq!(
            e.add(b"k", b"v2".to_vec(), 0, EXPIRE_NEVER, 0),
            Err(EngineError::NotStored)
        );
    }

    #[test]
    fn replace_requires_presence() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        assert_eq!(
            e.replace(b"k", b"v".to_vec(), 0, EXPIRE_NEVER, 0),
            Err(EngineError::NotStored)
        );
        e.set(b"k", b"v1".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.replace(b"k", b"v2".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert_eq!(e.get(b"k", 0).unwrap().value(), b"v2");
    }

    #[test]
    fn append_and_prepend() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        e.set(b"k", b"mid".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.append(b"k", b"-tail", 0, false).unwrap();
        assert_eq!(e.get(b"k", 0).unwrap().value(), b"mid-tail");
        e.append(b"k", b"head-", 0, true).unwrap();
        assert_eq!(e.get(b"k", 0).unwrap().value(), b"head-mid-tail");
    }

    #[test]
    fn lru_eviction_reclaims_oldest_on_pressure() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        // mem_limit allows only 3 slabs of 256 bytes, one chunk each.
        e.set(b"a", b"1".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"b", b"2".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"c", b"3".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        // "a" is least-recently-used; inserting "d" should evict it.
        e.set(b"d", b"4".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert!(e.get(b"a", 0).is_none());
        assert!(e.get(b"d", 0).is_some());
    }

    #[test]
    fn random_policy_evicts_something_under_pressure() {
        let mut e = small_engine(SlabEvictPolicy::Random);
        e.set(b"a", b"1".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"b", b"2".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"c", b"3".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert!(e.set(b"d", b"4".to_vec(), 0, EXPIRE_NEVER, 0).is_ok());
        assert_eq!(e.live_count(), 3, "one item must have been evicted to make room");
    }

    #[test]
    fn none_policy_reports_nomem_without_evicting() {
        let mut e = small_engine(SlabEvictPolicy::None);
        e.set(b"a", b"1".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"b", b"2".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"c", b"3".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        let result = e.set(b"d", b"4".to_vec(), 0, EXPIRE_NEVER, 0);
        assert_eq!(result, Err(EngineError::NoMem));
        assert!(e.get(b"a", 0).is_some(), "nothing should have been evicted");
    }

    #[test]
    fn seed_scenario_5_incr_on_non_numeric_value() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        e.set(b"k", b"abc".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert_eq!(e.arith(b"k", 1, 0, false), Err(EngineError::NonNumeric));
    }

    #[test]
    fn flush_all_clears_everything() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        e.set(b"a", b"1".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.set(b"b", b"2".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        e.flush_all();
        assert_eq!(e.live_count(), 0);
        assert!(e.get(b"a", 0).is_none());
    }

    #[test]
    fn oversized_value_rejected_before_allocation() {
        let mut e = small_engine(SlabEvictPolicy::Lru);
        let result = e.set(b"k", vec![0u8; 4096], 0, EXPIRE_NEVER, 0);
        assert_eq!(result, Err(EngineError::Oversized));
        assert_eq!(e.live_count(), 0);
    }
}
