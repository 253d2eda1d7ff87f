use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::mode::GameMode;

/// The published output of a scan run. Fully regenerated from the scan
/// cache every run, never patched in place.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LeaderboardSnapshot {
    pub duo_leaderboard: Vec<DuoEntry>,
    pub individual_leaderboard: Vec<UserEntry>,
    pub gd_leaderboard: Vec<UserEntry>,
    pub host_leaderboard: Vec<UserEntry>,
    pub total_sets_scanned: usize,
    pub total_duos: usize,
    pub total_individuals: usize,
    pub total_gders: usize,
    pub total_hosts: usize,
    #[serde(default)]
    pub updated_at: Box<str>,
}

/// A co-nominating pair. Names are stored in canonical display order
/// (case-insensitive lexicographic), independent of which id ended up
/// first during aggregation.
#[derive(Debug, Deserialize, Serialize)]
pub struct DuoEntry {
    pub bn1_name: Box<str>,
    pub bn2_name: Box<str>,
    pub bn1_modes: Vec<GameMode>,
    pub bn2_modes: Vec<GameMode>,
    pub modes: Vec<GameMode>,
    pub count: u32,
    pub last_date: Box<str>,
    #[serde(default)]
    pub mode_counts: HashMap<GameMode, u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserEntry {
    pub user_id: u32,
    pub username: Box<str>,
    pub count: u32,
    pub last_date: Box<str>,
    pub modes: Vec<GameMode>,
    #[serde(default)]
    pub mode_counts: HashMap<GameMode, u32>,
}
