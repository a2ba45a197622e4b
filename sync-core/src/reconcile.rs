//! Reconciliation Engine.
//!
//! Decides which locally held records a peer is missing, given only the
//! peer's per-origin freshness digest.
//!
//! This is a freshness-threshold filter, not a set difference: a peer that
//! reports timestamp `T` for an origin is assumed to already hold every
//! record of that origin at or before `T`. Ties count as "already held".

use relief_sync_types::{Record, Summary};

/// Whether `record` should be pushed to a peer whose digest is `remote`.
///
/// True if the peer has no entry for the record's origin, or its entry is
/// strictly older than the record.
pub fn is_missing_for_remote(record: &Record, remote: &Summary) -> bool {
    match remote.latest(&record.origin) {
        None => true,
        Some(latest) => latest < record.timestamp,
    }
}

/// Records from `local` that the peer described by `remote` is missing.
///
/// The result has set semantics; its order carries no meaning.
pub fn missing_for_remote<'a, I>(local: I, remote: &Summary) -> Vec<Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    local
        .into_iter()
        .filter(|r| is_missing_for_remote(r, remote))
        .cloned()
        .collect()
}
