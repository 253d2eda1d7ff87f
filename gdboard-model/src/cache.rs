use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

use gdboard_util::IntHasher;
use hashbrown::{HashMap, HashSet};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error as DeError, Unexpected, Visitor},
};

use crate::mode::GameMode;

/// Bumped whenever the cache schema changes incompatibly; outdated
/// files degrade to a full rescan instead of a parse failure.
pub const CACHE_VERSION: u32 = 2;

/// Persisted scan state. `scanned_ids` and every counter only ever
/// grow; a set id present in `scanned_ids` has contributed to each
/// counter exactly once.
#[derive(Debug, Deserialize, Serialize)]
pub struct ScanCache {
    #[serde(default)]
    pub cache_version: u32,
    #[serde(default)]
    pub scanned_ids: HashSet<u32, IntHasher>,
    #[serde(default)]
    pub pair_counts: HashMap<NominatorPair, EntityCounter>,
    #[serde(default)]
    pub individual_counts: HashMap<u32, EntityCounter, IntHasher>,
    #[serde(default)]
    pub gd_counts: HashMap<u32, EntityCounter, IntHasher>,
    #[serde(default)]
    pub host_counts: HashMap<u32, EntityCounter, IntHasher>,
    #[serde(default)]
    pub user_modes: HashMap<u32, BTreeSet<GameMode>, IntHasher>,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self {
            cache_version: CACHE_VERSION,
            scanned_ids: HashSet::default(),
            pair_counts: HashMap::default(),
            individual_counts: HashMap::default(),
            gd_counts: HashMap::default(),
            host_counts: HashMap::default(),
            user_modes: HashMap::default(),
        }
    }
}

/// Cumulative per-entity tally: total count, most recent contribution
/// date, and per-mode sub-counts.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct EntityCounter {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub last_date: Box<str>,
    #[serde(default)]
    pub mode_counts: HashMap<GameMode, u32>,
}

impl EntityCounter {
    /// One credit tagged with `date` and one sub-count per mode.
    pub fn record(&mut self, date: &str, modes: impl IntoIterator<Item = GameMode>) {
        self.count += 1;
        self.bump_date(date);

        for mode in modes {
            *self.mode_counts.entry(mode).or_default() += 1;
        }
    }

    /// ISO-8601 date strings sort chronologically so a plain string
    /// comparison suffices; empty dates never win.
    pub fn bump_date(&mut self, date: &str) {
        if !date.is_empty() && *date > *self.last_date {
            self.last_date = Box::from(date);
        }
    }

    /// The modes this entity has sub-counts for, sorted.
    pub fn modes(&self) -> Vec<GameMode> {
        let mut modes: Vec<_> = self.mode_counts.keys().copied().collect();
        modes.sort_unstable();

        modes
    }
}

/// Unordered pair of co-nominators, stored with the smaller id first
/// so `(a, b)` and `(b, a)` collapse into one key. Serializes as
/// `"lower,upper"` to stay a valid JSON object key.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NominatorPair {
    lower: u32,
    upper: u32,
}

impl NominatorPair {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    pub fn lower(self) -> u32 {
        self.lower
    }

    pub fn upper(self) -> u32 {
        self.upper
    }
}

impl Display for NominatorPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{},{}", self.lower, self.upper)
    }
}

impl Serialize for NominatorPair {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NominatorPair {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct PairVisitor;

        impl Visitor<'_> for PairVisitor {
            type Value = NominatorPair;

            fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str("a string of the form `id1,id2`")
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
                let (a, b) = v
                    .split_once(',')
                    .ok_or_else(|| DeError::invalid_value(Unexpected::Str(v), &self))?;

                let a = a
                    .parse()
                    .map_err(|_| DeError::invalid_value(Unexpected::Str(v), &self))?;

                let b = b
                    .parse()
                    .map_err(|_| DeError::invalid_value(Unexpected::Str(v), &self))?;

                Ok(NominatorPair::new(a, b))
            }
        }

        d.deserialize_str(PairVisitor)
    }
}
