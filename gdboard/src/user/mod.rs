//! Per-user leaderboard variants: instead of the global corpus, the
//! scan walks one user's beatmapset listings and tallies the people
//! around them.

use std::collections::BTreeSet;

use eyre::{Result, WrapErr};
use futures::{StreamExt, stream};
use gdboard_client::{Client, ClientError, UserSetsKind, fetch_offset_pages};
use gdboard_model::{
    Beatmap, BeatmapsetDetail, BeatmapsetRef, EntityCounter, GameMode, OsuUser, Progress,
    ProgressFn, UserEntry,
};
use gdboard_util::{CancelToken, IntHasher};
use hashbrown::{HashMap, HashSet};

use crate::{
    Outcome,
    scan::{deep, leaderboard::user_entries, names::NameResolver},
};

const PAGE_LIMIT: usize = 50;
const DETAIL_WORKERS: usize = 8;

/// Output of one per-user scan variant.
pub struct UserScanResult {
    pub user: OsuUser,
    pub entries: Vec<UserEntry>,
    pub total_sets: usize,
}

/// Guest mappers across the sets `user` hosts. Unlike the global guest
/// board this counts per difficulty, so a guest with three diffs in one
/// set gets three.
pub async fn gd_leaderboard(
    client: &Client,
    user: OsuUser,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Outcome<UserScanResult>> {
    let sets = match hosted_details(client, user.id, progress, cancel).await {
        Ok(sets) => sets,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Failed to fetch hosted beatmapsets"),
    };

    let mut counts: HashMap<u32, EntityCounter, IntHasher> = HashMap::default();

    for set in &sets {
        let host_id = set.host_id.unwrap_or(user.id);
        let date = set.date();

        for beatmap in &set.beatmaps {
            if beatmap.owners.is_empty() {
                if let Some(creator) = beatmap.user_id.filter(|&id| id != host_id && id != 0) {
                    counts.entry(creator).or_default().record(date, [beatmap.mode]);
                }
            } else {
                for owner in &beatmap.owners {
                    if owner.id != host_id && owner.id != 0 {
                        counts.entry(owner.id).or_default().record(date, [beatmap.mode]);
                    }
                }
            }
        }
    }

    finish(client, user, counts, sets.len(), progress, cancel).await
}

/// Hosts whose sets `user` guested on, one credit per difficulty the
/// user owns.
pub async fn gd_hosts_leaderboard(
    client: &Client,
    user: OsuUser,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Outcome<UserScanResult>> {
    let listed = match user_sets(client, user.id, &[UserSetsKind::Guest], progress, cancel).await {
        Ok(sets) => sets,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Failed to fetch guest beatmapsets"),
    };

    let sets = match full_details(client, listed, cancel).await {
        Ok(sets) => sets,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Failed to fetch beatmapset details"),
    };

    let mut counts: HashMap<u32, EntityCounter, IntHasher> = HashMap::default();

    for set in &sets {
        let Some(host_id) = set.host_id.filter(|&id| id != 0 && id != user.id) else {
            continue;
        };

        let date = set.date();

        for beatmap in &set.beatmaps {
            if owns_difficulty(beatmap, user.id) {
                counts.entry(host_id).or_default().record(date, [beatmap.mode]);
            }
        }
    }

    finish(client, user, counts, sets.len(), progress, cancel).await
}

/// Mappers whose sets `user` nominated, credited once per set.
pub async fn nominated_mappers_leaderboard(
    client: &Client,
    user: OsuUser,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Outcome<UserScanResult>> {
    let sets = match user_sets(client, user.id, &[UserSetsKind::Nominated], progress, cancel).await
    {
        Ok(sets) => sets,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Failed to fetch nominated beatmapsets"),
    };

    let mut counts: HashMap<u32, EntityCounter, IntHasher> = HashMap::default();

    for set in &sets {
        if let Some(host_id) = set.host_id.filter(|&id| id != 0) {
            counts
                .entry(host_id)
                .or_default()
                .record(set.date(), distinct_modes(&set.beatmaps));
        }
    }

    finish(client, user, counts, sets.len(), progress, cancel).await
}

/// Nominators of the sets `user` hosts, credited once per set. The
/// per-user listings carry no nomination data, so each set goes through
/// a deep fetch.
pub async fn nominator_leaderboard(
    client: &Client,
    user: OsuUser,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Outcome<UserScanResult>> {
    let sets = match user_sets(
        client,
        user.id,
        &[UserSetsKind::Ranked, UserSetsKind::Loved],
        progress,
        cancel,
    )
    .await
    {
        Ok(sets) => sets,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Failed to fetch hosted beatmapsets"),
    };

    let refs: Vec<BeatmapsetRef> = sets.iter().map(shallow_ref).collect();

    let (facts, failed) = match deep::deep_fetch_all(client, &refs, progress, cancel).await {
        Ok(res) => res,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Deep fetch failed"),
    };

    if !failed.is_empty() {
        warn!(failed = failed.len(), "Some beatmapsets stayed unavailable");
    }

    let mut counts: HashMap<u32, EntityCounter, IntHasher> = HashMap::default();

    for fact in &facts {
        let mut seen: HashSet<u32, IntHasher> = HashSet::default();

        for nomination in &fact.nominations {
            if nomination.user_id != 0 && seen.insert(nomination.user_id) {
                counts
                    .entry(nomination.user_id)
                    .or_default()
                    .record(&fact.date, nomination.rulesets.iter().copied());
            }
        }
    }

    finish(client, user, counts, sets.len(), progress, cancel).await
}

/// Drains the given listing flavors, deduplicated across them by id.
async fn user_sets(
    client: &Client,
    user_id: u32,
    kinds: &[UserSetsKind],
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Vec<BeatmapsetDetail>, ClientError> {
    let mut seen: HashSet<u32, IntHasher> = HashSet::default();
    let mut sets = Vec::new();

    for &kind in kinds {
        let fetched = fetch_offset_pages(PAGE_LIMIT, cancel, |offset| async move {
            client
                .user_beatmapsets_page(user_id, kind, PAGE_LIMIT, offset)
                .await
        })
        .await?;

        for set in fetched {
            if seen.insert(set.id) {
                sets.push(set);
            }
        }

        progress(Progress::FetchingUserSets {
            fetched: sets.len(),
        });
    }

    Ok(sets)
}

/// The listing payloads carry difficulties but no owner lists, so
/// every set is re-fetched in full; a failed detail fetch falls back
/// to the listing payload.
async fn full_details(
    client: &Client,
    sets: Vec<BeatmapsetDetail>,
    cancel: &CancelToken,
) -> Result<Vec<BeatmapsetDetail>, ClientError> {
    let tasks = sets.into_iter().map(|set| async move {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        match client.beatmapset(set.id).await {
            Ok(detail) => Ok(detail),
            Err(err @ ClientError::Cancelled) => Err(err),
            Err(err) => {
                debug!(set_id = set.id, %err, "Detail fetch failed, using listing payload");

                Ok(set)
            }
        }
    });

    let mut stream = stream::iter(tasks).buffer_unordered(DETAIL_WORKERS);
    let mut details = Vec::new();

    while let Some(detail) = stream.next().await {
        details.push(detail?);
    }

    Ok(details)
}

async fn hosted_details(
    client: &Client,
    user_id: u32,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Vec<BeatmapsetDetail>, ClientError> {
    let listed = user_sets(
        client,
        user_id,
        &[UserSetsKind::Ranked, UserSetsKind::Loved],
        progress,
        cancel,
    )
    .await?;

    full_details(client, listed, cancel).await
}

/// Mode sub-counts are per set everywhere, so repeated difficulty
/// modes collapse before recording.
fn distinct_modes(beatmaps: &[Beatmap]) -> BTreeSet<GameMode> {
    beatmaps.iter().map(|map| map.mode).collect()
}

fn owns_difficulty(beatmap: &Beatmap, user_id: u32) -> bool {
    beatmap.owners.iter().any(|owner| owner.id == user_id)
        || (beatmap.owners.is_empty() && beatmap.user_id == Some(user_id))
}

fn shallow_ref(set: &BeatmapsetDetail) -> BeatmapsetRef {
    BeatmapsetRef {
        id: set.id,
        host_id: set.host_id,
        creator: None,
        artist: Box::default(),
        title: Box::default(),
        ranked_date: set.ranked_date.clone(),
        last_updated: set.last_updated.clone(),
        status: set.status.clone(),
    }
}

async fn finish(
    client: &Client,
    user: OsuUser,
    counts: HashMap<u32, EntityCounter, IntHasher>,
    total_sets: usize,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Outcome<UserScanResult>> {
    let resolver = NameResolver::default();

    let outcome = resolver
        .resolve_all(client, counts.keys().copied(), progress, cancel)
        .await;

    if outcome.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    progress(Progress::BuildingLeaderboards);

    let entries = user_entries(&counts, &resolver);

    Ok(Outcome::Completed(UserScanResult {
        user,
        entries,
        total_sets,
    }))
}

#[cfg(test)]
mod tests {
    use gdboard_model::{BeatmapOwner, GameMode};

    use super::*;

    fn diff(creator: Option<u32>, owners: &[u32], mode: GameMode) -> Beatmap {
        Beatmap {
            id: 1,
            mode,
            user_id: creator,
            owners: owners
                .iter()
                .map(|&id| BeatmapOwner { id, username: None })
                .collect(),
            last_updated: None,
        }
    }

    fn set_with_diffs(id: u32, host: u32, beatmaps: Vec<Beatmap>) -> BeatmapsetDetail {
        BeatmapsetDetail {
            id,
            host_id: Some(host),
            ranked_date: Some(Box::from("2022-03-04T00:00:00+00:00")),
            last_updated: None,
            status: Box::from("ranked"),
            beatmaps,
            current_nominations: Vec::new(),
        }
    }

    #[test]
    fn difficulty_ownership_covers_both_shapes() {
        let by_creator = diff(Some(7), &[], GameMode::Osu);
        let by_owner = diff(Some(99), &[7], GameMode::Taiko);
        let someone_else = diff(Some(5), &[], GameMode::Mania);

        assert!(owns_difficulty(&by_creator, 7));
        assert!(owns_difficulty(&by_owner, 7));
        assert!(!owns_difficulty(&someone_else, 7));
        // An explicit owner list overrides the creator field.
        assert!(!owns_difficulty(&by_owner, 99));
    }

    #[test]
    fn repeated_difficulty_modes_record_once_per_set() {
        let set = set_with_diffs(
            1,
            5,
            vec![
                diff(Some(5), &[], GameMode::Osu),
                diff(Some(5), &[], GameMode::Osu),
                diff(Some(5), &[], GameMode::Osu),
                diff(Some(5), &[], GameMode::Taiko),
            ],
        );

        let mut counter = EntityCounter::default();
        counter.record(set.date(), distinct_modes(&set.beatmaps));

        assert_eq!(counter.count, 1);
        assert_eq!(counter.mode_counts[&GameMode::Osu], 1);
        assert_eq!(counter.mode_counts[&GameMode::Taiko], 1);
    }

    #[test]
    fn shallow_ref_keeps_the_dates() {
        let set = set_with_diffs(9, 5, Vec::new());
        let bref = shallow_ref(&set);

        assert_eq!(bref.id, 9);
        assert_eq!(bref.host_id, Some(5));
        assert_eq!(bref.date(), "2022-03-04");
    }
}
