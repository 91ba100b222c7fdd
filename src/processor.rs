//! Request processor (component C5): dispatches a parsed request to the
//! configured engine and produces a response, independent of which engine
//! (cuckoo or slab) is active.

use std::sync::atomic::Ordering;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::protocol::{Request, Response, StoreVerb, ValueLine};
use crate::stats::Stats;

pub struct ProcessOutcome {
    pub response: Response,
    pub close_connection: bool,
}

fn outcome(response: Response) -> ProcessOutcome {
    ProcessOutcome {
        response,
        close_connection: false,
    }
}

/// Map a failed store/delete/arith outcome onto its wire response. `OK` and
/// engine-specific success values are handled by each call site.
fn store_error_response(err: EngineError) -> Response {
    match err {
        EngineError::NotStored => Response::NotStored,
        EngineError::Exists => Response::Exists,
        EngineError::NotFound => Response::NotFound,
        EngineError::Oversized => Response::ServerError("object too large for cache".into()),
        EngineError::NoMem => Response::ServerError("out of memory storing object".into()),
        EngineError::NonNumeric => {
            Response::ClientError("cannot increment or decrement non-numeric value".into())
        }
    }
}

/// Dispatch one parsed request. `now` is seconds since server start, used
/// uniformly for expiry comparisons across the whole call.
pub fn process(engine: &mut Engine, stats: &Stats, allow_flush: bool, now: u32, req: Request) -> ProcessOutcome {
    match req {
        Request::Get { keys, with_cas } => {
            Stats::bump(&stats.cmd_get);
            // A per-key miss is not a failure (§4.5): `engine.get` is
            // infallible, so there is no engine-level failure path to
            // short-circuit the batch on here.
            let mut lines = Vec::with_capacity(keys.len());
            for key in &keys {
                match engine.get(key, now) {
                    Some(item) => {
                        Stats::bump(&stats.get_hits);
                        lines.push(ValueLine {
                            key: key.clone(),
                            flags: item.flags(),
                            value: item.value().to_vec(),
                            cas: with_cas.then(|| item.cas()),
                        });
                    }
                    None => Stats::bump(&stats.get_misses),
                }
            }
            outcome(Response::Values(lines))
        }

        Request::Store {
            verb,
            key,
            flags,
            expiry,
            value,
            cas,
            noreply,
        } => {
            Stats::bump(&stats.cmd_set);
            let result = match verb {
                StoreVerb::Set => engine.set(&key, value, flags, expiry, now),
                StoreVerb::Add => engine.add(&key, value, flags, expiry, now),
                StoreVerb::Replace => engine.replace(&key, value, flags, expiry, now),
                StoreVerb::Append => engine.append(&key, &value, now, false),
                StoreVerb::Prepend => engine.append(&key, &value, now, true),
                StoreVerb::Cas => {
                    let expected = cas.expect("parser always supplies cas for StoreVerb::Cas");
                    if result_is_cas_miss(engine, &key, now) {
                        Stats::bump(&stats.cas_misses);
                    } else {
                        Stats::bump(&stats.cas_hits);
                    }
                    engine.cas(&key, value, flags, expiry, expected, now)
                }
            };
            let response = match result {
                Ok(()) => Response::Stored,
                Err(EngineError::Exists) => {
                    Stats::bump(&stats.cas_badval);
                    Response::Exists
                }
                Err(e) => store_error_response(e),
            };
            if noreply {
                outcome(Response::Suppressed)
            } else {
                outcome(response)
            }
        }

        Request::Delete { key, noreply } => {
            Stats::bump(&stats.cmd_delete);
            let deleted = engine.delete(&key, now);
            if deleted {
                Stats::bump(&stats.delete_hits);
            } else {
                Stats::bump(&stats.delete_misses);
            }
            let response = if deleted { Response::Deleted } else { Response::NotFound };
            if noreply {
                outcome(Response::Suppressed)
            } else {
                outcome(response)
            }
        }

        Request::Incr { key, delta, noreply } => arith(engine, stats, now, key, delta, false, noreply),
        Request::Decr { key, delta, noreply } => arith(engine, stats, now, key, delta, true, noreply),

        Request::Stats => outcome(Response::Stats(stats.snapshot())),
        Request::Version => outcome(Response::Version(crate::VERSION.to_string())),
        Request::Ping => outcome(Response::Pong),
        Request::Quit => ProcessOutcome {
            response: Response::Suppressed,
            close_connection: true,
        },
        Request::FlushAll { noreply } => {
            let response = if allow_flush {
                engine.flush_all();
                Response::Ok
            } else {
                Response::ServerError("flush not permitted".into())
            };
            if noreply {
                outcome(Response::Suppressed)
            } else {
                outcome(response)
            }
        }
    }
}

fn result_is_cas_miss(engine: &mut Engine, key: &[u8], now: u32) -> bool {
    engine.get(key, now).is_none()
}

fn arith(
    engine: &mut Engine,
    stats: &Stats,
    now: u32,
    key: Vec<u8>,
    delta: u64,
    decr: bool,
    noreply: bool,
) -> ProcessOutcome {
    Stats::bump(if decr { &stats.cmd_decr } else { &stats.cmd_incr });
    let response = match engine.arith(&key, delta, now, decr) {
        Ok(v) => Response::Arith(v),
        Err(e) => store_error_response(e),
    };
    if noreply {
        outcome(Response::Suppressed)
    } else {
        outcome(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuckoo::{CuckooConfig, CuckooTable};
    use crate::item::EXPIRE_NEVER;
    use crate::protocol::Request;

    fn fresh() -> (Engine, Stats) {
        (Engine::Cuckoo(CuckooTable::new(CuckooConfig::default())), Stats::default())
    }

    #[test]
    fn seed_scenario_get_miss_is_end_not_error() {
        let (mut e, s) = fresh();
        let out = process(&mut e, &s, true, 0, Request::Get { keys: vec![b"nope".to_vec()], with_cas: false });
        assert_eq!(out.response, Response::Values(vec![]));
    }

    #[test]
    fn set_then_get_round_trips() {
        let (mut e, s) = fresh();
        process(&mut e, &s, true, 0, Request::Store {
            verb: StoreVerb::Set,
            key: b"foo".to_vec(),
            flags: 0,
            expiry: EXPIRE_NEVER,
            value: b"bar".to_vec(),
            cas: None,
            noreply: false,
        });
        let out = process(&mut e, &s, true, 0, Request::Get { keys: vec![b"foo".to_vec()], with_cas: false });
        match out.response {
            Response::Values(lines) => assert_eq!(lines[0].value, b"bar"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn noreply_suppresses_wire_response_but_still_executes() {
        let (mut e, s) = fresh();
        let out = process(&mut e, &s, true, 0, Request::Store {
            verb: StoreVerb::Set,
            key: b"foo".to_vec(),
            flags: 0,
            expiry: EXPIRE_NEVER,
            value: b"bar".to_vec(),
            cas: None,
            noreply: true,
        });
        assert_eq!(out.response, Response::Suppressed);
        let out = process(&mut e, &s, true, 0, Request::Get { keys: vec![b"foo".to_vec()], with_cas: false });
        assert!(matches!(out.response, Response::Values(ref v) if !v.is_empty()));
    }

    #[test]
    fn quit_closes_connection() {
        let (mut e, s) = fresh();
        let out = process(&mut e, &s, true, 0, Request::Quit);
        assert!(out.close_connection);
    }

    #[test]
    fn flush_all_denied_when_not_allowed() {
        let (mut e, s) = fresh();
        let out = process(&mut e, &s, false, 0, Request::FlushAll { noreply: false });
        assert!(matches!(out.response, Response::ServerError(_)));
    }
}
