//! Unifies the cuckoo and slab engines behind one dispatch surface so the
//! request processor (C5) can stay agnostic to which is configured.
//!
//! Exactly one engine backs a given process (see Design Notes: the handle
//! lives in the server's root state, never a module static), so this is a
//! closed two-variant enum rather than a `Box<dyn Trait>` — dispatch is a
//! single match with no indirection, and both engines are known at
//! compile time.

use crate::cuckoo::CuckooTable;
use crate::error::EngineResult;
use crate::item::Item;
use crate::slab::SlabEngine;

pub enum Engine {
    Cuckoo(CuckooTable),
    Slab(SlabEngine),
}

impl Engine {
    pub fn get(&mut self, key: &[u8], now: u32) -> Option<&Item> {
        match self {
            Engine::Cuckoo(t) => t.get(key, now),
            Engine::Slab(e) => e.get(key, now),
        }
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        match self {
            Engine::Cuckoo(t) => t.set(key, value, flags, expiry, now),
            Engine::Slab(e) => e.set(key, value, flags, expiry, now),
        }
    }

    pub fn add(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        match self {
            Engine::Cuckoo(t) => t.add(key, value, flags, expiry, now),
            Engine::Slab(e) => e.add(key, value, flags, expiry, now),
        }
    }

    pub fn replace(&mut self, key: &[u8], value: Vec<u8>, flags: u32, expiry: u32, now: u32) -> EngineResult<()> {
        match self {
            Engine::Cuckoo(t) => t.replace(key, value, expiry, now),
            Engine::Slab(e) => e.replace(key, value, flags, expiry, now),
        }
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
        match self {
            Engine::Cuckoo(t) => t.cas(key, value, expiry, expected_cas, now),
            Engine::Slab(e) => e.cas(key, value, flags, expiry, expected_cas, now),
        }
    }

    pub fn append(&mut self, key: &[u8], tail: &[u8], now: u32, prepend: bool) -> EngineResult<()> {
        match self {
            Engine::Cuckoo(t) => t.append(key, tail, now, prepend),
            Engine::Slab(e) => e.append(key, tail, now, prepend),
        }
    }

    pub fn delete(&mut self, key: &[u8], now: u32) -> bool {
        match self {
            Engine::Cuckoo(t) => t.delete(key, now),
            Engine::Slab(e) => e.delete(key, now),
        }
    }

    pub fn arith(&mut self, key: &[u8], delta: u64, now: u32, decr: bool) -> EngineResult<u64> {
        match self {
            Engine::Cuckoo(t) => t.arith(key, delta, now, decr),
            Engine::Slab(e) => e.arith(key, delta, now, decr),
        }
    }

    /// Unconditionally drop every live item. Cuckoo has no bulk primitive in
    /// its contract, so it is reimplemented here as a full rebuild.
    pub fn flush_all(&mut self) {
        match self {
            Engine::Cuckoo(t) => *t = CuckooTable::new(t.config().clone()),
            Engine::Slab(e) => e.flush_all(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::Cuckoo(_) => "cuckoo",
            Engine::Slab(_) => "slab",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuckoo::{CuckooConfig, CuckooPolicy};
    use crate::item::EXPIRE_NEVER;

    #[test]
    fn dispatches_to_cuckoo() {
        let mut engine = Engine::Cuckoo(CuckooTable::new(CuckooConfig {
            slot_size: 64,
            nslot: 8,
            d: 2,
            displace_max: 2,
            policy: CuckooPolicy::Expire,
        }));
        engine.set(b"k", b"v".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        assert_eq!(engine.get(b"k", 0).unwrap().value(), b"v");
        assert_eq!(engine.name(), "cuckoo");
    }

    #[test]
    fn flush_all_clears_cuckoo() {
        let mut engine = Engine::Cuckoo(CuckooTable::new(CuckooConfig::default()));
        engine.set(b"k", b"v".to_vec(), 0, EXPIRE_NEVER, 0).unwrap();
        engine.flush_all();
        assert!(engine.get(b"k", 0).is_none());
    }
}
