use std::collections::BTreeSet;

use gdboard_model::{EntityCounter, GameMode, NominatorPair, ScanCache, CACHE_VERSION};
use gdboard_util::IntHasher;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use super::deep::SetFacts;

/// In-memory form of the scan's running totals. Mirrors [`ScanCache`]
/// but keeps the types the merge wants to work with.
#[derive(Default)]
pub struct Counters {
    pub scanned_ids: HashSet<u32, IntHasher>,
    pub pair_counts: HashMap<NominatorPair, EntityCounter>,
    pub individual_counts: HashMap<u32, EntityCounter, IntHasher>,
    pub gd_counts: HashMap<u32, EntityCounter, IntHasher>,
    pub host_counts: HashMap<u32, EntityCounter, IntHasher>,
    pub user_modes: HashMap<u32, BTreeSet<GameMode>, IntHasher>,
}

impl Counters {
    pub fn from_cache(cache: ScanCache) -> Self {
        Self {
            scanned_ids: cache.scanned_ids,
            pair_counts: cache.pair_counts,
            individual_counts: cache.individual_counts,
            gd_counts: cache.gd_counts,
            host_counts: cache.host_counts,
            user_modes: cache.user_modes,
        }
    }

    pub fn into_cache(self) -> ScanCache {
        ScanCache {
            cache_version: CACHE_VERSION,
            scanned_ids: self.scanned_ids,
            pair_counts: self.pair_counts,
            individual_counts: self.individual_counts,
            gd_counts: self.gd_counts,
            host_counts: self.host_counts,
            user_modes: self.user_modes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scanned_ids.is_empty()
    }

    /// Every user id any leaderboard will need a name for.
    pub fn referenced_user_ids(&self) -> HashSet<u32, IntHasher> {
        let mut ids = HashSet::default();

        for pair in self.pair_counts.keys() {
            ids.insert(pair.lower());
            ids.insert(pair.upper());
        }

        ids.extend(self.individual_counts.keys());
        ids.extend(self.gd_counts.keys());
        ids.extend(self.host_counts.keys());
        ids.remove(&0);

        ids
    }

    /// Folds one deep-fetched set into the totals. A set already in
    /// `scanned_ids` is skipped outright so re-merging is idempotent;
    /// degraded facts are never merged at all.
    pub fn merge(&mut self, facts: &SetFacts) {
        if facts.is_degraded() || !self.scanned_ids.insert(facts.set_id) {
            return;
        }

        let date = &facts.date;

        // Multiple nomination events by the same user on one set count
        // once; rulesets from the duplicates still accumulate.
        let mut nominator_modes: HashMap<u32, BTreeSet<GameMode>, IntHasher> = HashMap::default();

        for nomination in &facts.nominations {
            if nomination.user_id == 0 {
                continue;
            }

            nominator_modes
                .entry(nomination.user_id)
                .or_default()
                .extend(nomination.rulesets.iter().copied());
        }

        for (&user_id, modes) in nominator_modes.iter() {
            let modes = effective_modes(modes, &facts.set_modes);

            self.individual_counts
                .entry(user_id)
                .or_default()
                .record(date, modes.iter().copied());

            self.user_modes.entry(user_id).or_default().extend(&modes);
        }

        let mut nominator_ids: Vec<u32> = nominator_modes.keys().copied().collect();
        nominator_ids.sort_unstable();

        for (a, b) in nominator_ids.into_iter().tuple_combinations() {
            let a_modes = effective_modes(&nominator_modes[&a], &facts.set_modes);
            let b_modes = effective_modes(&nominator_modes[&b], &facts.set_modes);

            // Modes both nominators covered, or everything either did
            // when their rulesets were disjoint.
            let shared: BTreeSet<_> = a_modes.intersection(&b_modes).copied().collect();

            let duo_modes = if shared.is_empty() {
                a_modes.union(&b_modes).copied().collect()
            } else {
                shared
            };

            self.pair_counts
                .entry(NominatorPair::new(a, b))
                .or_default()
                .record(date, duo_modes.iter().copied());
        }

        for (&user_id, modes) in facts.gd_modes.iter() {
            if user_id == 0 {
                continue;
            }

            self.gd_counts
                .entry(user_id)
                .or_default()
                .record(date, modes.iter().copied());
            self.user_modes.entry(user_id).or_default().extend(modes);
        }

        if let Some(host_id) = facts.host_id.filter(|&id| id != 0) {
            self.host_counts
                .entry(host_id)
                .or_default()
                .record(date, facts.host_modes.iter().copied());

            self.user_modes
                .entry(host_id)
                .or_default()
                .extend(&facts.host_modes);
        }
    }
}

/// A nomination without ruleset scoping covers the whole set.
fn effective_modes(
    nominated: &BTreeSet<GameMode>,
    set_modes: &BTreeSet<GameMode>,
) -> BTreeSet<GameMode> {
    if nominated.is_empty() {
        if set_modes.is_empty() {
            BTreeSet::from([GameMode::Osu])
        } else {
            set_modes.clone()
        }
    } else {
        nominated.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::scan::deep::NominationFact;

    use super::*;

    fn facts(set_id: u32, host_id: u32, date: &str, nominators: &[u32]) -> SetFacts {
        SetFacts {
            set_id,
            date: Box::from(date),
            host_id: Some(host_id),
            host_modes: BTreeSet::from([GameMode::Osu]),
            set_modes: BTreeSet::from([GameMode::Osu]),
            gd_modes: HashMap::default(),
            nominations: nominators
                .iter()
                .map(|&user_id| NominationFact {
                    user_id,
                    rulesets: vec![GameMode::Osu],
                })
                .collect(),
        }
    }

    #[test]
    fn two_sets_produce_expected_counts() {
        let mut counters = Counters::default();

        counters.merge(&facts(101, 5, "2021-06-01", &[7, 8]));
        counters.merge(&facts(102, 6, "2021-07-15", &[7, 9]));

        assert_eq!(counters.individual_counts[&7].count, 2);
        assert_eq!(counters.individual_counts[&8].count, 1);
        assert_eq!(counters.individual_counts[&9].count, 1);

        assert_eq!(counters.pair_counts[&NominatorPair::new(7, 8)].count, 1);
        assert_eq!(counters.pair_counts[&NominatorPair::new(9, 7)].count, 1);

        assert_eq!(counters.host_counts[&5].count, 1);
        assert_eq!(counters.host_counts[&6].count, 1);

        assert_eq!(counters.individual_counts[&7].last_date.as_ref(), "2021-07-15");
    }

    #[test]
    fn remerging_a_scanned_set_changes_nothing() {
        let mut counters = Counters::default();
        let set = facts(101, 5, "2021-06-01", &[7, 8]);

        counters.merge(&set);
        counters.merge(&set);

        assert_eq!(counters.individual_counts[&7].count, 1);
        assert_eq!(counters.host_counts[&5].count, 1);
        assert_eq!(counters.scanned_ids.len(), 1);
    }

    #[test]
    fn duplicate_nominations_by_one_user_count_once() {
        let mut counters = Counters::default();
        let mut set = facts(101, 5, "2021-06-01", &[7]);

        set.nominations.push(NominationFact {
            user_id: 7,
            rulesets: vec![GameMode::Taiko],
        });

        counters.merge(&set);

        assert_eq!(counters.individual_counts[&7].count, 1);
        assert_eq!(
            counters.individual_counts[&7].modes(),
            vec![GameMode::Osu, GameMode::Taiko]
        );
        assert!(counters.pair_counts.is_empty());
    }

    #[test]
    fn three_nominators_yield_all_pairs() {
        let mut counters = Counters::default();

        counters.merge(&facts(101, 5, "2021-06-01", &[9, 7, 8]));

        assert_eq!(counters.pair_counts.len(), 3);
        assert_eq!(counters.pair_counts[&NominatorPair::new(7, 8)].count, 1);
        assert_eq!(counters.pair_counts[&NominatorPair::new(7, 9)].count, 1);
        assert_eq!(counters.pair_counts[&NominatorPair::new(8, 9)].count, 1);
    }

    #[test]
    fn disjoint_duo_rulesets_fall_back_to_union() {
        let mut counters = Counters::default();
        let mut set = facts(101, 5, "2021-06-01", &[]);

        set.nominations = vec![
            NominationFact {
                user_id: 7,
                rulesets: vec![GameMode::Osu],
            },
            NominationFact {
                user_id: 8,
                rulesets: vec![GameMode::Mania],
            },
        ];

        counters.merge(&set);

        let pair = &counters.pair_counts[&NominatorPair::new(7, 8)];

        assert_eq!(pair.modes(), vec![GameMode::Osu, GameMode::Mania]);
    }

    #[test]
    fn overlapping_duo_rulesets_keep_the_intersection() {
        let mut counters = Counters::default();
        let mut set = facts(101, 5, "2021-06-01", &[]);

        set.nominations = vec![
            NominationFact {
                user_id: 7,
                rulesets: vec![GameMode::Osu, GameMode::Taiko],
            },
            NominationFact {
                user_id: 8,
                rulesets: vec![GameMode::Taiko, GameMode::Mania],
            },
        ];

        counters.merge(&set);

        let pair = &counters.pair_counts[&NominatorPair::new(7, 8)];

        assert_eq!(pair.modes(), vec![GameMode::Taiko]);
    }

    #[test]
    fn unscoped_nomination_covers_the_set_modes() {
        let mut counters = Counters::default();
        let mut set = facts(101, 5, "2021-06-01", &[]);

        set.set_modes = BTreeSet::from([GameMode::Taiko, GameMode::Mania]);
        set.nominations = vec![NominationFact {
            user_id: 7,
            rulesets: Vec::new(),
        }];

        counters.merge(&set);

        assert_eq!(
            counters.individual_counts[&7].modes(),
            vec![GameMode::Taiko, GameMode::Mania]
        );
    }

    #[test]
    fn guest_difficulty_credit_once_per_set() {
        let mut counters = Counters::default();
        let mut set = facts(101, 5, "2021-06-01", &[7]);

        // Two difficulties by the same guest in one set.
        set.gd_modes.insert(
            12,
            BTreeSet::from([GameMode::Osu, GameMode::Taiko]),
        );

        counters.merge(&set);

        assert_eq!(counters.gd_counts[&12].count, 1);
        assert_eq!(
            counters.gd_counts[&12].modes(),
            vec![GameMode::Osu, GameMode::Taiko]
        );
    }

    #[test]
    fn degraded_facts_are_not_merged() {
        let mut counters = Counters::default();
        let mut set = facts(101, 5, "2021-06-01", &[7]);
        set.host_id = None;

        counters.merge(&set);

        assert!(counters.is_empty());
        assert!(!counters.scanned_ids.contains(&101));
    }

    #[test]
    fn unknown_nominator_id_is_skipped() {
        let mut counters = Counters::default();

        counters.merge(&facts(101, 5, "2021-06-01", &[0, 7]));

        assert!(!counters.individual_counts.contains_key(&0));
        assert!(counters.pair_counts.is_empty());
    }

    #[test]
    fn cache_roundtrip_preserves_totals() {
        let mut counters = Counters::default();

        counters.merge(&facts(101, 5, "2021-06-01", &[7, 8]));

        let cache = counters.into_cache();

        assert_eq!(cache.cache_version, CACHE_VERSION);

        let restored = Counters::from_cache(cache);

        assert_eq!(restored.individual_counts[&7].count, 1);
        assert!(restored.scanned_ids.contains(&101));
    }
}
