//! Process-wide metrics: per-counter relaxed atomic increments, tolerating
//! minor skew under concurrent access (see Design Notes — the "global"
//! state here is a plain field on the server's root state, not a module
//! static).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// One counter's value, in a form that serializes cleanly for anything that
/// wants the `stats` snapshot as structured data rather than wire text.
#[derive(Debug, Clone, Serialize)]
pub struct StatEntry {
    pub name: String,
    pub value: u64,
}

macro_rules! counters {
    ($($field:ident => $name:literal),+ $(,)?) => {
        #[derive(Debug, Default)]
        pub struct Stats {
            $(pub $field: AtomicU64,)+
        }

        impl Stats {
            /// Snapshot every counter as `(name, value)` pairs, in
            /// declaration order, for the admin `stats` command.
            pub fn snapshot(&self) -> Vec<(String, String)> {
                vec![
                    $(($name.to_string(), self.$field.load(Ordering::Relaxed).to_string()),)+
                ]
            }

            /// Same data as `snapshot`, structured for serialization.
            pub fn snapshot_entries(&self) -> Vec<StatEntry> {
                vec![
                    $(StatEntry { name: $name.to_string(), value: self.$field.load(Ordering::Relaxed) },)+
                ]
            }
        }
    };
}

counters! {
    cmd_get => "cmd_get",
    cmd_set => "cmd_set",
    cmd_delete => "cmd_delete",
    cmd_incr => "cmd_incr",
    cmd_decr => "cmd_decr",
    get_hits => "get_hits",
    get_misses => "get_misses",
    delete_hits => "delete_hits",
    delete_misses => "delete_misses",
    cas_hits => "cas_hits",
    cas_misses => "cas_misses",
    cas_badval => "cas_badval",
    total_connections => "total_connections",
    curr_connections => "curr_connections",
    conn_dropped_ring_full => "conn_dropped_ring_full",
}

impl Stats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
