//! Eviction/reclamation policy for the cuckoo engine.

/// Governs both how victims are chosen during displacement and whether an
/// expired slot counts as "empty" for the purposes of insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuckooPolicy {
    /// Victim is chosen uniformly at random among the `D` candidates.
    /// Expired slots are *not* implicitly reclaimed by insert; only explicit
    /// delete or eviction frees them.
    Random,
    /// Victim is the candidate with the earliest expiry (ties broken by
    /// lowest slot index). Expired slots ARE treated as empty for insert.
    Expire,
}
