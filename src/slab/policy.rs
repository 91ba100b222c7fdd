//! Eviction policy for the slab engine, selected at configuration time.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlabEvictPolicy {
    /// Eviction disabled; allocation failure is reported as `NoMem`.
    None,
    /// Reclaim the LRU-tail chunk of a uniformly-chosen occupied class,
    /// irrespective of which class needs room.
    Random,
    /// Reclaim from the tail of the LRU list of the class that needs room.
    Lru,
    /// Sweep a bounded sample looking for already-expired items first;
    /// fall back to `Lru` if none are found.
    ExpiredFirst,
}
