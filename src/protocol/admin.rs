//! Admin protocol verb set, restated as a declarative table per the Design
//! Notes' preference for a single source of truth over X-macro expansion.
//! Data-port and admin-port connections share the same parser; this table
//! only documents which verbs are meaningful on the admin port and is used
//! by the processor to decide whether `flush` is permitted.

use super::request::Request;

pub const ADMIN_VERBS: &[&str] = &["stats", "version", "flush", "quit"];

pub fn is_admin_request(req: &Request) -> bool {
    matches!(
        req,
        Request::Stats | Request::Version | Request::Quit | Request::FlushAll { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_requests_are_not_admin() {
        assert!(!is_admin_request(&Request::Get {
            keys: vec![b"k".to_vec()],
            with_cas: false,
        }));
    }

    #[test]
    fn stats_is_admin() {
        assert!(is_admin_request(&Request::Stats));
    }
}
