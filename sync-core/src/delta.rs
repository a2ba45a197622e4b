//! Delta planning under a payload budget.
//!
//! The data characteristic carries a bounded payload, so a delta larger
//! than the budget is split across sessions instead of being truncated.
//!
//! Records are sent in ascending timestamp order. After a partial push the
//! peer's next summary reports the highest timestamp it received for each
//! origin, and strict-greater-than reconciliation picks up exactly the
//! records that were held back. The one hazard is a cut through a run of
//! records sharing an `(origin, timestamp)` pair: the peer would report that
//! timestamp and the rest of the run would never be resent. Such runs are
//! therefore deferred whole.

use relief_sync_types::{Record, SyncError, WireCodec, BATCH_HEADER_LEN};

/// Outcome of fitting a delta into one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaPlan {
    /// Records to send now, ascending by timestamp.
    pub batch: Vec<Record>,
    /// Records held back for a later session.
    pub deferred: Vec<Record>,
    /// Records that cannot fit in a payload even on their own.
    pub unsendable: Vec<Record>,
}

impl DeltaPlan {
    /// Whether nothing will be sent.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Choose the records from `missing` that go out in this session.
pub fn plan_delta(mut missing: Vec<Record>, codec: &WireCodec) -> Result<DeltaPlan, SyncError> {
    missing.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.origin.cmp(&b.origin))
            .then_with(|| a.id.cmp(&b.id))
    });

    let budget = codec.max_payload().saturating_sub(BATCH_HEADER_LEN);
    let mut plan = DeltaPlan::default();
    let mut used = 0usize;
    let mut remaining = missing.into_iter();

    while let Some(record) = remaining.next() {
        let len = codec.frame_len(&record)?;
        if len > budget {
            plan.unsendable.push(record);
            continue;
        }
        if used + len > budget || plan.batch.len() == u16::MAX as usize {
            // Pull back any same-(origin, timestamp) run sitting at the tail.
            let mut held = Vec::new();
            while plan
                .batch
                .last()
                .is_some_and(|r| r.origin == record.origin && r.timestamp == record.timestamp)
            {
                if let Some(r) = plan.batch.pop() {
                    held.push(r);
                }
            }
            held.reverse();
            plan.deferred = held;
            plan.deferred.push(record);
            plan.deferred.extend(remaining);
            break;
        }
        used += len;
        plan.batch.push(record);
    }

    Ok(plan)
}
