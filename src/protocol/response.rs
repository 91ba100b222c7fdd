//! Response data model composed back onto the wire by [`super::compose`].

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueLine {
    pub key: Vec<u8>,
    pub flags: u32,
    pub value: Vec<u8>,
    /// Present only when the originating request was `GETS`.
    pub cas: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Ok,
    Pong,
    Version(String),
    /// Zero or more hits followed by `END`; zero hits is still a valid GET
    /// response (not an error).
    Values(Vec<ValueLine>),
    Arith(u64),
    Stats(Vec<(String, String)>),
    ClientError(String),
    ServerError(String),
    /// `noreply` suppressed the wire response entirely, but the request
    /// still ran and any counters it affects were still bumped.
    Suppressed,
}
