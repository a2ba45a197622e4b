//! Summary Builder.
//!
//! Folds a set of records into the per-origin freshness digest that is
//! exchanged before any record data.

use relief_sync_types::{Record, Summary};

/// Compute the latest timestamp per origin over `records`.
///
/// Deterministic for a given set of records regardless of iteration order.
/// O(number of records).
pub fn build_summary<'a, I>(records: I) -> Summary
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut summary = Summary::new();
    for record in records {
        summary.observe(&record.origin, record.timestamp);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_sync_types::{OriginId, Timestamp};

    fn record(origin: &str, ts: u64) -> Record {
        Record::with_timestamp(
            OriginId::from(origin),
            Timestamp::from_millis(ts),
            0.0,
            0.0,
            "1.0",
            "full",
        )
    }

    #[test]
    fn empty_store_yields_empty_summary() {
        assert!(build_summary(&Vec::<Record>::new()).is_empty());
    }

    #[test]
    fn keeps_latest_per_origin() {
        let records = vec![record("A", 1), record("A", 3), record("B", 2)];
        let summary = build_summary(&records);

        assert_eq!(summary.len(), 2);
        assert_eq!(
            summary.latest(&OriginId::from("A")),
            Some(Timestamp::from_millis(3))
        );
        assert_eq!(
            summary.latest(&OriginId::from("B")),
            Some(Timestamp::from_millis(2))
        );
    }

    #[test]
    fn independent_of_insertion_order() {
        let forward = vec![record("A", 1), record("A", 3), record("B", 2)];
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut shuffled = forward.clone();
        shuffled.swap(0, 2);

        let expected = build_summary(&forward);
        assert_eq!(build_summary(&reversed), expected);
        assert_eq!(build_summary(&shuffled), expected);
    }
}
