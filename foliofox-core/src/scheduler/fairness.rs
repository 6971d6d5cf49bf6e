//! Deficit round-robin per-user fairness. A `BTreeMap` keeps iteration
//! order deterministic by `UserId` so ties resolve the same way on
//! every run, which the scheduling fairness scenario tests rely on.

use std::collections::BTreeMap;

use foliofox_model::ids::UserId;

/// One fairness quantum charged per scheduling round to every user who
/// currently has at least one admittable job.
const QUANTUM: i64 = 1;

#[derive(Debug, Default)]
pub struct DeficitTable {
    deficits: BTreeMap<UserId, i64>,
}

impl DeficitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one quantum to every user in `ready_users`. Called once per
    /// scheduling round before a job is admitted.
    pub fn accrue(&mut self, ready_users: &[UserId]) {
        for user in ready_users {
            *self.deficits.entry(*user).or_insert(0) += QUANTUM;
        }
    }

    /// Picks the user with the highest deficit among `candidates`. On a
    /// tie, the lowest `UserId` wins (`BTreeMap` iterates ascending and
    /// only a strictly greater deficit replaces the running best).
    pub fn pick_highest(&self, candidates: &[UserId]) -> Option<UserId> {
        let mut best: Option<(UserId, i64)> = None;
        for &user in candidates {
            let deficit = self.deficits.get(&user).copied().unwrap_or(0);
            match best {
                None => best = Some((user, deficit)),
                Some((_, best_deficit)) if deficit > best_deficit => best = Some((user, deficit)),
                _ => {}
            }
        }
        best.map(|(user, _)| user)
    }

    /// Charges `cost` (job cost is always 1) against `user`'s deficit
    /// after a job of theirs is admitted.
    pub fn charge(&mut self, user: UserId, cost: i64) {
        *self.deficits.entry(user).or_insert(0) -= cost;
    }

    pub fn forget(&mut self, user: UserId) {
        self.deficits.remove(&user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starved_user_accumulates_deficit_and_wins() {
        let mut table = DeficitTable::new();
        let a = UserId::new();
        let b = UserId::new();

        // Round 1: both ready, a served.
        table.accrue(&[a, b]);
        assert_eq!(table.pick_highest(&[a, b]), Some(a).or(Some(b)));
        table.charge(a, 1);

        // Round 2: only b ready (a has no more jobs this round).
        table.accrue(&[b]);
        let winner = table.pick_highest(&[b]);
        assert_eq!(winner, Some(b));
    }

    #[test]
    fn charging_reduces_future_priority() {
        let mut table = DeficitTable::new();
        let a = UserId::new();
        let b = UserId::new();

        table.accrue(&[a, b]);
        table.accrue(&[a, b]);
        table.charge(a, 2);

        // a now at 0, b at 2: b should win.
        assert_eq!(table.pick_highest(&[a, b]), Some(b));
    }

    #[test]
    fn tie_breaks_deterministically_by_lowest_user_id() {
        let mut table = DeficitTable::new();
        let mut ids = vec![UserId::new(), UserId::new()];
        ids.sort();
        let (low, high) = (ids[0], ids[1]);
        table.accrue(&[low, high]);
        assert_eq!(table.pick_highest(&[low, high]), Some(low));
    }
}
