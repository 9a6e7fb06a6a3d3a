//! Delta computation between announcement tables.
//!
//! A delta at serial `n` carries the changes that turn the table at `n - 1`
//! into the table at `n`. Applying it removes the withdrawals and inserts
//! the additions; the two sets are always disjoint.

use std::collections::BTreeSet;

use crate::announcement::Announcement;
use crate::serial::SerialNumber;

/// The changes between two consecutive serials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Serial this delta leads to.
    pub serial: SerialNumber,
    /// Records present at `serial` but not at `serial - 1`.
    pub additions: BTreeSet<Announcement>,
    /// Records present at `serial - 1` but not at `serial`.
    pub withdrawals: BTreeSet<Announcement>,
}

impl Delta {
    /// Compute the delta leading from `old` to `new`, labelled `serial`.
    pub fn between(
        serial: SerialNumber,
        old: &BTreeSet<Announcement>,
        new: &BTreeSet<Announcement>,
    ) -> Self {
        let (additions, withdrawals) = compute_delta(old, new);
        Self {
            serial,
            additions,
            withdrawals,
        }
    }

    /// True if the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.withdrawals.is_empty()
    }

    /// Total number of records touched.
    pub fn len(&self) -> usize {
        self.additions.len() + self.withdrawals.len()
    }

    /// Apply this delta to `table` in place.
    pub fn apply_to(&self, table: &mut BTreeSet<Announcement>) {
        for withdrawn in &self.withdrawals {
            table.remove(withdrawn);
        }
        table.extend(self.additions.iter().copied());
    }

    /// Fold the following delta into this one.
    ///
    /// A record added by one side and withdrawn by the other cancels out, so
    /// the result never withdraws a record the starting table lacks nor
    /// announces one it already has.
    pub fn then(&mut self, next: &Delta) {
        for withdrawn in &next.withdrawals {
            if !self.additions.remove(withdrawn) {
                self.withdrawals.insert(*withdrawn);
            }
        }
        for added in &next.additions {
            if !self.withdrawals.remove(added) {
                self.additions.insert(*added);
            }
        }
        self.serial = next.serial;
    }
}

/// Compute `(additions, withdrawals)` turning `old` into `new`.
///
/// `additions = new - old`, `withdrawals = old - new`.
pub fn compute_delta(
    old: &BTreeSet<Announcement>,
    new: &BTreeSet<Announcement>,
) -> (BTreeSet<Announcement>, BTreeSet<Announcement>) {
    let additions = new.difference(old).copied().collect();
    let withdrawals = old.difference(new).copied().collect();
    (additions, withdrawals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::IpPrefix;
    use crate::types::Asn;
    use proptest::prelude::*;

    fn roa(asn: u32, prefix: &str, max: Option<u8>) -> Announcement {
        Announcement::new(Asn(asn), prefix.parse().unwrap(), max).unwrap()
    }

    fn arb_announcement() -> impl Strategy<Value = Announcement> {
        (any::<u32>(), any::<u32>(), 0u8..=32, prop::option::of(0u8..=32)).prop_filter_map(
            "max length below prefix length",
            |(asn, addr, len, max)| {
                let prefix = IpPrefix::new(std::net::Ipv4Addr::from(addr).into(), len).ok()?;
                Announcement::new(Asn(asn), prefix, max).ok()
            },
        )
    }

    #[test]
    fn test_compute_delta() {
        let a = roa(3333, "10.0.0.0/8", Some(8));
        let b = roa(3333, "10.0.0.0/8", Some(24));
        let c = roa(64512, "192.168.0.0/16", None);

        let old: BTreeSet<_> = [a, c].into_iter().collect();
        let new: BTreeSet<_> = [b, c].into_iter().collect();

        let delta = Delta::between(SerialNumber(2), &old, &new);
        assert_eq!(delta.additions, [b].into_iter().collect());
        assert_eq!(delta.withdrawals, [a].into_iter().collect());
        assert_eq!(delta.len(), 2);
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_identical_sets_give_empty_delta() {
        let set: BTreeSet<_> = [roa(1, "10.0.0.0/8", None)].into_iter().collect();
        assert!(Delta::between(SerialNumber(1), &set, &set).is_empty());
    }

    proptest! {
        #[test]
        fn test_apply_delta_yields_target(
            old in prop::collection::btree_set(arb_announcement(), 0..40),
            new in prop::collection::btree_set(arb_announcement(), 0..40),
        ) {
            let delta = Delta::between(SerialNumber(1), &old, &new);
            let mut table = old.clone();
            delta.apply_to(&mut table);
            prop_assert_eq!(table, new);
            prop_assert!(delta.additions.is_disjoint(&delta.withdrawals));
        }

        #[test]
        fn test_then_matches_direct_delta(
            a in prop::collection::btree_set(arb_announcement(), 0..30),
            b in prop::collection::btree_set(arb_announcement(), 0..30),
            c in prop::collection::btree_set(arb_announcement(), 0..30),
        ) {
            let mut folded = Delta::between(SerialNumber(1), &a, &b);
            folded.then(&Delta::between(SerialNumber(2), &b, &c));
            prop_assert_eq!(folded, Delta::between(SerialNumber(2), &a, &c));
        }
    }
}
