//! Per-origin freshness digest.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::{OriginId, Timestamp};

/// Latest timestamp observed locally for each origin.
///
/// A derived, ephemeral digest: recomputed from the store on demand and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(BTreeMap<OriginId, Timestamp>);

impl Summary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, keeping the maximum timestamp per origin.
    pub fn observe(&mut self, origin: &OriginId, timestamp: Timestamp) {
        match self.0.get_mut(origin) {
            Some(latest) if *latest >= timestamp => {}
            Some(latest) => *latest = timestamp,
            None => {
                self.0.insert(origin.clone(), timestamp);
            }
        }
    }

    /// Fold another digest in, keeping the later timestamp per origin.
    pub fn merge(&mut self, other: &Summary) {
        for (origin, timestamp) in other {
            self.observe(origin, *timestamp);
        }
    }

    /// Latest timestamp known for an origin.
    pub fn latest(&self, origin: &OriginId) -> Option<Timestamp> {
        self.0.get(origin).copied()
    }

    /// Number of origins in the digest.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the digest has no origins.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate origins in sorted order.
    pub fn iter(&self) -> btree_map::Iter<'_, OriginId, Timestamp> {
        self.0.iter()
    }
}

impl FromIterator<(OriginId, Timestamp)> for Summary {
    fn from_iter<I: IntoIterator<Item = (OriginId, Timestamp)>>(iter: I) -> Self {
        let mut summary = Summary::new();
        for (origin, timestamp) in iter {
            summary.observe(&origin, timestamp);
        }
        summary
    }
}

impl<'a> IntoIterator for &'a Summary {
    type Item = (&'a OriginId, &'a Timestamp);
    type IntoIter = btree_map::Iter<'a, OriginId, Timestamp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn observe_keeps_maximum() {
        let a = OriginId::from("a");
        let mut summary = Summary::new();
        summary.observe(&a, ts(10));
        summary.observe(&a, ts(30));
        summary.observe(&a, ts(20));
        assert_eq!(summary.latest(&a), Some(ts(30)));
        assert_eq!(summary.len(), 1);
    }

    #[test]
    fn merge_keeps_later_timestamps() {
        let (a, b, c) = (OriginId::from("a"), OriginId::from("b"), OriginId::from("c"));
        let mut left: Summary = vec![(a.clone(), ts(5)), (b.clone(), ts(9))].into_iter().collect();
        let right: Summary = vec![(a.clone(), ts(7)), (b.clone(), ts(1)), (c.clone(), ts(3))]
            .into_iter()
            .collect();

        left.merge(&right);

        assert_eq!(left.latest(&a), Some(ts(7)));
        assert_eq!(left.latest(&b), Some(ts(9)));
        assert_eq!(left.latest(&c), Some(ts(3)));
    }

    #[test]
    fn unknown_origin_has_no_entry() {
        let summary = Summary::new();
        assert!(summary.is_empty());
        assert_eq!(summary.latest(&OriginId::from("x")), None);
    }

    #[test]
    fn collects_from_pairs() {
        let summary: Summary = vec![
            (OriginId::from("b"), ts(2)),
            (OriginId::from("a"), ts(1)),
            (OriginId::from("b"), ts(5)),
        ]
        .into_iter()
        .collect();

        let entries: Vec<_> = summary.iter().map(|(o, t)| (o.as_str(), *t)).collect();
        assert_eq!(entries, vec![("a", ts(1)), ("b", ts(5))]);
    }
}
