//! Incremental memcached ASCII parser (component C4, request side).
//!
//! One line per request, optionally followed by a CRLF-terminated data
//! block for storage commands. The parser never blocks on I/O: it reports
//! [`ParseOutcome::Unfinished`] when the buffer doesn't yet hold a complete
//! request, and the caller is expected to read more bytes and call again.
//! On a syntax error it reports [`ParseOutcome::Invalid`] and drops into
//! swallow mode, discarding bytes up to the next CRLF before resuming
//! header parsing — this makes the parser self-resynchronizing after
//! garbage input rather than wedging the connection.

use super::buffer::DoublingBuffer;
use super::request::{Request, StoreVerb};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Complete(Request),
    Unfinished,
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Header,
    Value,
    Swallow,
}

#[derive(Debug, Clone)]
struct PendingStore {
    verb: StoreVerb,
    key: Vec<u8>,
    flags: u32,
    expiry: u32,
    vlen: usize,
    cas: Option<u64>,
    noreply: bool,
}

/// Per-connection parser state. One instance lives as long as the
/// connection; `next_request` is called repeatedly as bytes arrive.
#[derive(Debug, Default)]
pub struct Parser {
    pending: Option<PendingStore>,
    swallowing: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> State {
        if self.swallowing {
            State::Swallow
        } else if self.pending.is_some() {
            State::Value
        } else {
            State::Header
        }
    }

    /// Attempt to extract the next complete request from `buf`. May consume
    /// bytes even when returning `Unfinished` is *not* the case — on
    /// `Unfinished` nothing is consumed, so the caller can safely top up the
    /// buffer and retry.
    pub fn next_request(&mut self, buf: &mut DoublingBuffer) -> ParseOutcome {
        loop {
            match self.state() {
                State::Swallow => match find_crlf(buf.unread()) {
                    Some(pos) => {
                        buf.consume(pos + 2);
                        self.swallowing = false;
                        // resume header parsing in the same call
                    }
                    None => return ParseOutcome::Unfinished,
                },
                State::Value => {
                    let pending = self.pending.as_ref().expect("pending checked above");
                    let need = pending.vlen + 2;
                    if buf.unread().len() < need {
                        return ParseOutcome::Unfinished;
                    }
                    let pending = self.pending.take().expect("pending checked above");
                    let value = buf.unread()[..pending.vlen].to_vec();
                    let trailer_ok = &buf.unread()[pending.vlen..need] == b"\r\n";
                    buf.consume(need);
                    if !trailer_ok {
                        return ParseOutcome::Invalid("bad data chunk");
                    }
                    return ParseOutcome::Complete(Request::Store {
                        verb: pending.verb,
                        key: pending.key,
                        flags: pending.flags,
                        expiry: pending.expiry,
                        value,
                        cas: pending.cas,
                        noreply: pending.noreply,
                    });
                }
                State::Header => {
                    let pos = match find_crlf(buf.unread()) {
                        Some(pos) => pos,
                        None => return ParseOutcome::Unfinished,
                    };
                    let line: Vec<u8> = buf.unread()[..pos].to_vec();
                    buf.consume(pos + 2);

                    match parse_header(&line) {
                        HeaderOutcome::Complete(req) => return ParseOutcome::Complete(req),
                        HeaderOutcome::AwaitValue(pending) => {
                            self.pending = Some(pending);
                            // loop back around into State::Value
                        }
                        HeaderOutcome::Invalid(msg) => {
                            self.swallowing = false; // already consumed the offending line
                            return ParseOutcome::Invalid(msg);
                        }
                    }
                }
            }
        }
    }
}

enum HeaderOutcome {
    Complete(Request),
    AwaitValue(PendingStore),
    Invalid(&'static str),
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}

fn tokens(line: &[u8]) -> Vec<&[u8]> {
    line.split(|&b| b == b' ').filter(|t| !t.is_empty()).collect()
}

fn parse_u32(tok: &[u8]) -> Option<u32> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_u64(tok: &[u8]) -> Option<u64> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_usize(tok: &[u8]) -> Option<usize> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_header(line: &[u8]) -> HeaderOutcome {
    let toks = tokens(line);
    let Some(&verb) = toks.first() else {
        return HeaderOutcome::Invalid("bad command line format");
    };

    match verb {
        b"get" | b"gets" => {
            if toks.len() < 2 {
                return HeaderOutcome::Invalid("bad command line format");
            }
            let keys = toks[1..].iter().map(|k| k.to_vec()).collect();
            HeaderOutcome::Complete(Request::Get {
                keys,
                with_cas: verb == b"gets",
            })
        }
        b"set" | b"add" | b"replace" | b"append" | b"prepend" | b"cas" => {
            parse_storage_header(verb, &toks)
        }
        b"delete" => {
            if toks.len() < 2 {
                return HeaderOutcome::Invalid("bad command line format");
            }
            let noreply = toks.last() == Some(&&b"noreply"[..]);
            HeaderOutcome::Complete(Request::Delete {
                key: toks[1].to_vec(),
                noreply,
            })
        }
        b"incr" | b"decr" => {
            if toks.len() < 3 {
                return HeaderOutcome::Invalid("bad command line format");
            }
            let Some(delta) = parse_u64(toks[2]) else {
                return HeaderOutcome::Invalid("invalid numeric delta argument");
            };
            let noreply = toks.last() == Some(&&b"noreply"[..]);
            let key = toks[1].to_vec();
            HeaderOutcome::Complete(if verb == b"incr" {
                Request::Incr { key, delta, noreply }
            } else {
                Request::Decr { key, delta, noreply }
            })
        }
        b"stats" => HeaderOutcome::Complete(Request::Stats),
        b"version" => HeaderOutcome::Complete(Request::Version),
        b"quit" => HeaderOutcome::Complete(Request::Quit),
        b"ping" => HeaderOutcome::Complete(Request::Ping),
        b"flush" => {
            let noreply = toks.last() == Some(&&b"noreply"[..]);
            HeaderOutcome::Complete(Request::FlushAll { noreply })
        }
        _ => HeaderOutcome::Invalid("unknown command"),
    }
}

fn parse_storage_header(verb: &[u8], toks: &[&[u8]]) -> HeaderOutcome {
    let store_verb = match verb {
        b"set" => StoreVerb::Set,
        b"add" => StoreVerb::Add,
        b"replace" => StoreVerb::Replace,
        b"append" => StoreVerb::Append,
        b"prepend" => StoreVerb::Prepend,
        b"cas" => StoreVerb::Cas,
        _ => unreachable!("caller matched on the same verb set"),
    };
    let min_len = if store_verb == StoreVerb::Cas { 6 } else { 5 };
    if toks.len() < min_len {
        return HeaderOutcome::Invalid("bad command line format");
    }
    let key = toks[1].to_vec();
    let (Some(flags), Some(expiry), Some(vlen)) =
        (parse_u32(toks[2]), parse_u32(toks[3]), parse_usize(toks[4]))
    else {
        return HeaderOutcome::Invalid("bad command line format");
    };

    let mut idx = 5;
    let cas = if store_verb == StoreVerb::Cas {
        let Some(c) = toks.get(idx).and_then(|t| parse_u64(t)) else {
            return HeaderOutcome::Invalid("bad command line format");
        };
        idx += 1;
        Some(c)
    } else {
        None
    };
    let noreply = toks.get(idx) == Some(&&b"noreply"[..]);

    HeaderOutcome::AwaitValue(PendingStore {
        verb: store_verb,
        key,
        flags,
        expiry,
        vlen,
        cas,
        noreply,
    })
}
