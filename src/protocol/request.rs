//! Parsed request data model (§3): a verb plus type-specific fields. Keys
//! and values are owned byte buffers here rather than buffer views, trading
//! a copy for a parser that is not tied to the input buffer's lifetime —
//! simpler to hand across the worker→processor boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `GET`/`GETS`: `with_cas` selects whether VALUE lines report CAS.
    Get { keys: Vec<Vec<u8>>, with_cas: bool },
    Store {
        verb: StoreVerb,
        key: Vec<u8>,
        flags: u32,
        expiry: u32,
        value: Vec<u8>,
        /// Present only for `Cas`.
        cas: Option<u64>,
        noreply: bool,
    },
    Delete { key: Vec<u8>, noreply: bool },
    Incr { key: Vec<u8>, delta: u64, noreply: bool },
    Decr { key: Vec<u8>, delta: u64, noreply: bool },
    Stats,
    Version,
    Quit,
    Ping,
    FlushAll { noreply: bool },
}
