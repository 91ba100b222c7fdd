//! Item arena and per-class allocation, grounded in the spec's Design Notes
//! preference for arena indices over raw pointers: items never move once
//! allocated, so a hash bucket or LRU link is just a `u32` into this arena.
//!
//! A "slab" is modeled as a budget rather than a literal separate memory
//! region: carving a slab means reserving `nchunk_per_slab` fresh arena
//! slots for a class and charging `slab_size` bytes against the pool's
//! memory limit. This keeps the same fixed-chunk-per-class discipline as
//! the source without requiring raw byte-range slicing, which would read as
//! a transliteration rather than idiomatic Rust.

use crate::item::Item;

use super::class::SlabClassTable;

pub type ItemId = u32;

pub(super) struct ArenaEntry {
    pub item: Item,
    pub class: usize,
    pub hash_next: Option<ItemId>,
    pub lru_prev: Option<ItemId>,
    pub lru_next: Option<ItemId>,
}

/// Owns all item storage for the slab engine: the arena itself, per-class
/// free lists, per-class LRU lists, and the global memory budget.
pub struct SlabPool {
    classes: SlabClassTable,
    slab_size: usize,
    mem_limit: usize,
    mem_used: usize,
    entries: Vec<Option<ArenaEntry>>,
    free_list: Vec<Vec<ItemId>>,
    lru_head: Vec<Option<ItemId>>,
    lru_tail: Vec<Option<ItemId>>,
    live_count: usize,
    /// `slab_use_freeq`: when disabled, freed chunks are abandoned instead
    /// of recycled, forcing fresh slabs to be carved until the memory
    /// budget is exhausted. Mirrors an option the source exposes for
    /// benchmarking allocator behavior; off by default would waste memory,
    /// so engines should leave this `true` unless explicitly configured.
    use_freeq: bool,
}

impl SlabPool {
    pub fn new(classes: SlabClassTable, slab_size: usize, mem_limit: usize) -> Self {
        Self::with_freeq(classes, slab_size, mem_limit, true)
    }

    pub fn with_freeq(
        classes: SlabClassTable,
        slab_size: usize,
        mem_limit: usize,
        use_freeq: bool,
    ) -> Self {
        let nclass = classes.len();
        Self {
            classes,
            slab_size,
            mem_limit,
            mem_used: 0,
            entries: Vec::new(),
            free_list: vec![Vec::new(); nclass],
            lru_head: vec![None; nclass],
            lru_tail: vec![None; nclass],
            live_count: 0,
            use_freeq,
        }
    }

    pub fn classes(&self) -> &SlabClassTable {
        &self.classes
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn mem_used(&self) -> usize {
        self.mem_used
    }

    pub fn item(&self, id: ItemId) -> &Item {
        &self.entries[id as usize].as_ref().expect("dangling item id").item
    }

    pub fn item_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.entries[id as usize].as_mut().expect("dangling item id").item
    }

    pub fn class_of(&self, id: ItemId) -> usize {
        self.entries[id as usize].as_ref().expect("dangling item id").class
    }

    pub(super) fn hash_next(&self, id: ItemId) -> Option<ItemId> {
        self.entries[id as usize].as_ref().expect("dangling item id").hash_next
    }

    pub(super) fn set_hash_next(&mut self, id: ItemId, next: Option<ItemId>) {
        self.entries[id as usize].as_mut().expect("dangling item id").hash_next = next;
    }

    /// Carve a fresh slab's worth of chunks for `class` if the memory
    /// budget allows, pushing them onto its free list. Returns `false` if
    /// the budget is exhausted (caller must evict and retry).
    fn carve_slab(&mut self, class: usize) -> bool {
        if self.mem_used + self.slab_size > self.mem_limit {
            return false;
        }
        let nchunk = self.classes.nchunk_per_slab(class);
        for _ in 0..nchunk {
            let id = self.entries.len() as ItemId;
            self.entries.push(None);
            self.free_list[class].push(id);
        }
        self.mem_used += self.slab_size;
        true
    }

    /// Allocate a chunk in `class`, carving a new slab if needed. Returns
    /// `item` back on the error path (budget exhausted with no free chunk)
    /// so the caller can evict and retry without re-cloning it.
    pub fn alloc(&mut self, class: usize, item: Item) -> Result<ItemId, Item> {
        if self.free_list[class].is_empty() && !self.carve_slab(class) {
            return Err(item);
        }
        let id = match self.free_list[class].pop() {
            Some(id) => id,
            None => return Err(item),
        };
        self.entries[id as usize] = Some(ArenaEntry {
            item,
            class,
            hash_next: None,
            lru_prev: None,
            lru_next: None,
        });
        self.live_count += 1;
        Ok(id)
    }

    /// Reclaim the chunk at `id` back to its class's free list. Caller must
    /// have already unlinked it from the hash index and LRU list.
    pub fn free(&mut self, id: ItemId) {
        let class = self.class_of(id);
        self.entries[id as usize] = None;
        if self.use_freeq {
            self.free_list[class].push(id);
        }
        self.live_count -= 1;
    }

    /// Any class currently holding at least one free chunk, preferring the
    /// requested class. Used by `RANDOM` eviction to pick an eviction
    /// target irrespective of which class triggered the allocation.
    pub fn any_occupied_class(&self) -> Option<usize> {
        (0..self.classes.len()).find(|&c| self.lru_tail[c].is_some())
    }

    // --- LRU -------------------------------------------------------------

    pub fn lru_tail(&self, class: usize) -> Option<ItemId> {
        self.lru_tail[class]
    }

    pub fn lru_iter(&self, class: usize) -> LruIter<'_> {
        LruIter {
            pool: self,
            next: self.lru_head[class],
        }
    }

    pub fn lru_unlink(&mut self, id: ItemId) {
        let class = self.class_of(id);
        let (prev, next) = {
            let e = self.entries[id as usize].as_ref().unwrap();
            (e.lru_prev, e.lru_next)
        };
        match prev {
            Some(p) => self.entries[p as usize].as_mut().unwrap().lru_next = next,
            None => self.lru_head[class] = next,
        }
        match next {
            Some(n) => self.entries[n as usize].as_mut().unwrap().lru_prev = prev,
            None => self.lru_tail[class] = prev,
        }
        let e = self.entries[id as usize].as_mut().unwrap();
        e.lru_prev = None;
        e.lru_next = None;
    }

    pub fn lru_push_head(&mut self, id: ItemId) {
        let class = self.class_of(id);
        let old_head = self.lru_head[class];
        {
            let e = self.entries[id as usize].as_mut().unwrap();
            e.lru_prev = None;
            e.lru_next = old_head;
        }
        if let Some(h) = old_head {
            self.entries[h as usize].as_mut().unwrap().lru_prev = Some(id);
        }
        self.lru_head[class] = Some(id);
        if self.lru_tail[class].is_none() {
            self.lru_tail[class] = Some(id);
        }
    }

    /// Move an already-linked item to the head of its class's LRU list.
    pub fn lru_touch(&mut self, id: ItemId) {
        if self.lru_head[self.class_of(id)] == Some(id) {
            return;
        }
        self.lru_unlink(id);
        self.lru_push_head(id);
    }
}

pub struct LruIter<'a> {
    pool: &'a SlabPool,
    next: Option<ItemId>,
}

impl<'a> Iterator for LruIter<'a> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        let current = self.next?;
        self.next = self.pool.entries[current as usize]
            .as_ref()
            .and_then(|e| e.lru_next);
        Some(current)
    }
}
