use gdboard_model::{DuoEntry, EntityCounter, GameMode, LeaderboardSnapshot, UserEntry};
use gdboard_util::datetime::snapshot_timestamp;
use hashbrown::HashMap;

use super::{aggregate::Counters, names::NameResolver};

/// Renders the running totals into the published snapshot. Every board
/// is sorted by count descending, ties broken by name ascending.
pub fn build(counters: &Counters, names: &NameResolver) -> LeaderboardSnapshot {
    let mut duo_leaderboard: Vec<DuoEntry> = counters
        .pair_counts
        .iter()
        .map(|(pair, counter)| {
            let mut bn1_id = pair.lower();
            let mut bn2_id = pair.upper();
            let mut bn1_name = names.get(bn1_id);
            let mut bn2_name = names.get(bn2_id);

            // Display order is by name, not by id.
            if bn1_name.to_lowercase() > bn2_name.to_lowercase() {
                std::mem::swap(&mut bn1_id, &mut bn2_id);
                std::mem::swap(&mut bn1_name, &mut bn2_name);
            }

            DuoEntry {
                bn1_name: Box::from(&*bn1_name),
                bn2_name: Box::from(&*bn2_name),
                bn1_modes: user_modes(counters, bn1_id),
                bn2_modes: user_modes(counters, bn2_id),
                modes: counter.modes(),
                count: counter.count,
                last_date: counter.last_date.clone(),
                mode_counts: counter.mode_counts.clone(),
            }
        })
        .collect();

    duo_leaderboard.sort_unstable_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.bn1_name.to_lowercase().cmp(&b.bn1_name.to_lowercase()))
            .then_with(|| a.bn2_name.to_lowercase().cmp(&b.bn2_name.to_lowercase()))
    });

    let individual_leaderboard = user_entries(&counters.individual_counts, names);
    let gd_leaderboard = user_entries(&counters.gd_counts, names);
    let host_leaderboard = user_entries(&counters.host_counts, names);

    LeaderboardSnapshot {
        total_sets_scanned: counters.scanned_ids.len(),
        total_duos: duo_leaderboard.len(),
        total_individuals: individual_leaderboard.len(),
        total_gders: gd_leaderboard.len(),
        total_hosts: host_leaderboard.len(),
        duo_leaderboard,
        individual_leaderboard,
        gd_leaderboard,
        host_leaderboard,
        updated_at: snapshot_timestamp(),
    }
}

fn user_modes(counters: &Counters, user_id: u32) -> Vec<GameMode> {
    counters
        .user_modes
        .get(&user_id)
        .map(|modes| modes.iter().copied().collect())
        .unwrap_or_default()
}

pub(crate) fn user_entries<S>(
    counts: &HashMap<u32, EntityCounter, S>,
    names: &NameResolver,
) -> Vec<UserEntry> {
    let mut entries: Vec<UserEntry> = counts
        .iter()
        .map(|(&user_id, counter)| UserEntry {
            user_id,
            username: Box::from(&*names.get(user_id)),
            count: counter.count,
            last_date: counter.last_date.clone(),
            modes: counter.modes(),
            mode_counts: counter.mode_counts.clone(),
        })
        .collect();

    entries.sort_unstable_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
    });

    entries
}

#[cfg(test)]
mod tests {
    use crate::scan::deep::{NominationFact, SetFacts};
    use std::collections::BTreeSet;

    use super::*;

    fn nomination(user_id: u32) -> NominationFact {
        NominationFact {
            user_id,
            rulesets: vec![GameMode::Osu],
        }
    }

    fn facts(set_id: u32, host_id: u32, date: &str, nominators: &[u32]) -> SetFacts {
        SetFacts {
            set_id,
            date: Box::from(date),
            host_id: Some(host_id),
            host_modes: BTreeSet::from([GameMode::Osu]),
            set_modes: BTreeSet::from([GameMode::Osu]),
            gd_modes: hashbrown::HashMap::default(),
            nominations: nominators.iter().copied().map(nomination).collect(),
        }
    }

    #[test]
    fn boards_sort_by_count_then_name() {
        let mut counters = Counters::default();

        counters.merge(&facts(1, 50, "2021-01-01", &[7, 8]));
        counters.merge(&facts(2, 50, "2021-02-01", &[7, 8]));
        counters.merge(&facts(3, 51, "2021-03-01", &[8, 9]));
        counters.merge(&facts(4, 52, "2021-04-01", &[7, 9]));

        let names = NameResolver::default();
        names.prime([
            (7u32, Box::from("zym")),
            (8, Box::from("Alba")),
            (9, Box::from("mika")),
        ]);

        let snapshot = build(&counters, &names);

        assert_eq!(snapshot.total_sets_scanned, 4);
        assert_eq!(snapshot.total_duos, 3);

        // Top duo by count, then the two single-count duos by name.
        assert_eq!(&*snapshot.duo_leaderboard[0].bn1_name, "Alba");
        assert_eq!(&*snapshot.duo_leaderboard[0].bn2_name, "zym");
        assert_eq!(snapshot.duo_leaderboard[0].count, 2);
        assert_eq!(&*snapshot.duo_leaderboard[1].bn1_name, "Alba");
        assert_eq!(&*snapshot.duo_leaderboard[1].bn2_name, "mika");
        assert_eq!(&*snapshot.duo_leaderboard[2].bn1_name, "mika");
        assert_eq!(&*snapshot.duo_leaderboard[2].bn2_name, "zym");

        // 7 nominated 3 sets, 8 nominated 3 sets; "Alba" sorts first.
        assert_eq!(&*snapshot.individual_leaderboard[0].username, "Alba");
        assert_eq!(&*snapshot.individual_leaderboard[1].username, "zym");
        assert_eq!(snapshot.individual_leaderboard[1].count, 3);

        assert_eq!(snapshot.host_leaderboard[0].user_id, 50);
        assert_eq!(snapshot.host_leaderboard[0].count, 2);
    }

    #[test]
    fn duo_names_are_in_display_order() {
        let mut counters = Counters::default();

        // Higher id holds the alphabetically smaller name.
        counters.merge(&facts(1, 50, "2021-01-01", &[200, 100]));

        let names = NameResolver::default();
        names.prime([(100u32, Box::from("Zelq")), (200, Box::from("aeril"))]);

        let snapshot = build(&counters, &names);
        let duo = &snapshot.duo_leaderboard[0];

        assert_eq!(&*duo.bn1_name, "aeril");
        assert_eq!(&*duo.bn2_name, "Zelq");
    }

    #[test]
    fn unresolved_users_keep_placeholders() {
        let mut counters = Counters::default();

        counters.merge(&facts(1, 50, "2021-01-01", &[7]));

        let snapshot = build(&counters, &NameResolver::default());

        assert_eq!(&*snapshot.individual_leaderboard[0].username, "User_7");
        assert_eq!(&*snapshot.host_leaderboard[0].username, "User_50");
    }

    #[test]
    fn empty_counters_render_an_empty_snapshot() {
        let snapshot = build(&Counters::default(), &NameResolver::default());

        assert_eq!(snapshot.total_sets_scanned, 0);
        assert!(snapshot.duo_leaderboard.is_empty());
        assert!(!snapshot.updated_at.is_empty());
    }
}
