use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use gdboard_client::{Client, ClientError};
use gdboard_model::{
    BeatmapsetDetail, BeatmapsetRef, GameMode, NominationEvents, Progress, ProgressFn,
};
use gdboard_util::{CancelToken, IntHasher, datetime::date_only};
use hashbrown::HashMap;
use tokio::time::{Duration, sleep};

/// More in-flight detail requests than this reliably triggers 429s
/// from the API.
pub const DEEP_FETCH_WORKERS: usize = 8;

/// The retry pass runs narrower to give throttled requests air.
const RETRY_WORKERS: usize = 5;

/// `min_date` fallback for the nomination-events lookup when a set has
/// no usable date; predates every ranked set.
const EARLIEST_DATE: &str = "2007-01-01";

/// Source of full beatmapset detail; the real client refreshes its
/// token once on a 401 internally. Split out so the pool and fact
/// extraction are testable without a network.
#[async_trait]
pub trait DetailSource: Sync {
    async fn beatmapset(&self, set_id: u32) -> Result<BeatmapsetDetail, ClientError>;

    async fn nomination_events(&self, min_date: &str) -> Result<NominationEvents, ClientError>;
}

#[async_trait]
impl DetailSource for Client {
    async fn beatmapset(&self, set_id: u32) -> Result<BeatmapsetDetail, ClientError> {
        Client::beatmapset(self, set_id).await
    }

    async fn nomination_events(&self, min_date: &str) -> Result<NominationEvents, ClientError> {
        Client::nomination_events(self, min_date).await
    }
}

/// One nominator of a set together with the rulesets the nomination
/// covered; an empty list means the API omitted ruleset scoping.
#[derive(Clone, Debug)]
pub struct NominationFact {
    pub user_id: u32,
    pub rulesets: Vec<GameMode>,
}

/// Everything the aggregation needs from one set, derived from a deep
/// fetch. `host_id` is `None` exactly when the fetch degraded to the
/// shallow reference; degraded facts are retried, never merged.
#[derive(Clone, Debug)]
pub struct SetFacts {
    pub set_id: u32,
    pub date: Box<str>,
    pub host_id: Option<u32>,
    pub host_modes: BTreeSet<GameMode>,
    pub set_modes: BTreeSet<GameMode>,
    pub gd_modes: HashMap<u32, BTreeSet<GameMode>, IntHasher>,
    pub nominations: Vec<NominationFact>,
}

impl SetFacts {
    fn degraded(bset: &BeatmapsetRef) -> Self {
        Self {
            set_id: bset.id,
            date: Box::from(bset.date()),
            host_id: None,
            host_modes: BTreeSet::new(),
            set_modes: BTreeSet::new(),
            gd_modes: HashMap::default(),
            nominations: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.host_id.is_none()
    }
}

/// Deep-fetches one set and derives its facts. Never errors; any
/// failure yields a degraded result so coverage accounting stays
/// intact.
pub async fn process_set<S: DetailSource>(source: &S, bset: &BeatmapsetRef) -> SetFacts {
    let detail = match source.beatmapset(bset.id).await {
        Ok(detail) => detail,
        Err(ClientError::NotFound) => {
            debug!(set_id = bset.id, "Beatmapset absent upstream");

            return SetFacts::degraded(bset);
        }
        Err(err) => {
            warn!(set_id = bset.id, %err, "Deep fetch failed");

            return SetFacts::degraded(bset);
        }
    };

    let mut facts = extract_facts(bset, &detail);

    // Current nomination state is wiped once a set unranks and
    // re-ranks; recover historical nominators from the events feed.
    if facts.nominations.is_empty() && !facts.is_degraded() {
        let min_date = match bset.date() {
            "" => EARLIEST_DATE,
            date => date,
        };

        match source.nomination_events(min_date).await {
            Ok(events) => {
                for event in events.events {
                    if event.beatmapset_id() != Some(bset.id) {
                        continue;
                    }

                    let Some(user_id) = event.nominator_id() else {
                        continue;
                    };

                    if let Some(created_at) = event.created_at.as_deref() {
                        let created = date_only(created_at);

                        if !created.is_empty() && *created > *facts.date {
                            facts.date = Box::from(created);
                        }
                    }

                    facts.nominations.push(NominationFact {
                        user_id,
                        rulesets: event.mode().into_iter().collect(),
                    });
                }
            }
            Err(err) => {
                debug!(set_id = bset.id, %err, "Nomination events fallback failed");
            }
        }
    }

    facts
}

fn extract_facts(bset: &BeatmapsetRef, detail: &BeatmapsetDetail) -> SetFacts {
    let host_id = detail.host_id.or(bset.host_id);

    let date = match detail.date() {
        "" => bset.date(),
        date => date,
    };

    let mut facts = SetFacts {
        set_id: bset.id,
        date: Box::from(date),
        host_id,
        host_modes: BTreeSet::new(),
        set_modes: BTreeSet::new(),
        gd_modes: HashMap::default(),
        nominations: Vec::new(),
    };

    let Some(host_id) = host_id else {
        return facts;
    };

    for beatmap in &detail.beatmaps {
        facts.set_modes.insert(beatmap.mode);

        if beatmap.owners.is_empty() {
            match beatmap.user_id {
                Some(creator) if creator == host_id => {
                    facts.host_modes.insert(beatmap.mode);
                }
                Some(creator) => {
                    facts.gd_modes.entry(creator).or_default().insert(beatmap.mode);
                }
                None => {}
            }
        } else {
            for owner in &beatmap.owners {
                if owner.id == host_id {
                    facts.host_modes.insert(beatmap.mode);
                } else {
                    facts.gd_modes.entry(owner.id).or_default().insert(beatmap.mode);
                }
            }
        }
    }

    // Hosts of fully guest-mapped (or degraded) sets still get their
    // credit attributed somewhere observable.
    if facts.host_modes.is_empty() {
        facts.host_modes = if facts.set_modes.is_empty() {
            BTreeSet::from([GameMode::Osu])
        } else {
            facts.set_modes.clone()
        };
    }

    facts.nominations = detail
        .current_nominations
        .iter()
        .map(|nom| NominationFact {
            user_id: nom.user_id,
            rulesets: nom.rulesets.clone().unwrap_or_default(),
        })
        .collect();

    facts
}

/// Runs the main deep-fetch pass plus one narrower retry pass over
/// everything that degraded. Returns the usable facts and the ids that
/// failed both passes; those stay unscanned for this run.
pub async fn deep_fetch_all<S: DetailSource>(
    source: &S,
    sets: &[BeatmapsetRef],
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<(Vec<SetFacts>, Vec<u32>), ClientError> {
    let total = sets.len();

    let first_pass =
        run_pool(source, sets.iter(), DEEP_FETCH_WORKERS, 0, total, progress, cancel).await?;

    let (mut facts, degraded): (Vec<_>, Vec<_>) = first_pass
        .into_iter()
        .partition(|fact| !fact.is_degraded());

    if degraded.is_empty() {
        return Ok((facts, Vec::new()));
    }

    progress(Progress::RetryingFailures {
        failed: degraded.len(),
    });

    // Give the upstream some air before hammering the failures again.
    sleep(Duration::from_secs(2)).await;

    let retry_refs: Vec<&BeatmapsetRef> = sets
        .iter()
        .filter(|bset| degraded.iter().any(|fact| fact.set_id == bset.id))
        .collect();

    // Resume the progress count at the first pass's successes so the
    // retry pass never reports a smaller `done` than already announced.
    let second_pass = run_pool(
        source,
        retry_refs.into_iter(),
        RETRY_WORKERS,
        facts.len(),
        total,
        progress,
        cancel,
    )
    .await?;

    let mut failed = Vec::new();

    for fact in second_pass {
        if fact.is_degraded() {
            failed.push(fact.set_id);
        } else {
            facts.push(fact);
        }
    }

    Ok((facts, failed))
}

async fn run_pool<'s, S, I>(
    source: &S,
    sets: I,
    width: usize,
    done_base: usize,
    total: usize,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Vec<SetFacts>, ClientError>
where
    S: DetailSource,
    I: Iterator<Item = &'s BeatmapsetRef>,
{
    let tasks = sets.map(|bset| async move {
        // Cancellation observed before a task's first request skips the
        // network entirely.
        if cancel.is_cancelled() {
            None
        } else {
            Some(process_set(source, bset).await)
        }
    });

    let mut stream = stream::iter(tasks).buffer_unordered(width);
    let mut facts = Vec::with_capacity(total);
    let mut done = done_base;

    while let Some(fact) = stream.next().await {
        let Some(fact) = fact else {
            return Err(ClientError::Cancelled);
        };

        done += 1;

        if done % 50 == 0 || done == total {
            progress(Progress::DeepScanning { done, total });
        }

        facts.push(fact);
    }

    if cancel.is_cancelled() {
        return Err(ClientError::Cancelled);
    }

    Ok(facts)
}

#[cfg(test)]
mod tests {
    use gdboard_model::{
        Beatmap, BeatmapOwner, CurrentNomination, EventBeatmapset, EventUser, NominationEvent,
    };
    use parking_lot::Mutex;

    use super::*;

    fn shallow(id: u32, host: u32) -> BeatmapsetRef {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "user_id": host,
            "artist": "artist",
            "title": "title",
            "ranked_date": "2021-06-01T00:00:00+00:00",
            "status": "ranked",
        }))
        .unwrap()
    }

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

    fn detail(id: u32, host: u32, beatmaps: Vec<Beatmap>, noms: &[u32]) -> BeatmapsetDetail {
        BeatmapsetDetail {
            id,
            host_id: Some(host),
            ranked_date: Some(Box::from("2021-06-01T00:00:00+00:00")),
            last_updated: None,
            status: Box::from("ranked"),
            beatmaps,
            current_nominations: noms
                .iter()
                .map(|&user_id| CurrentNomination {
                    user_id,
                    rulesets: Some(vec![GameMode::Osu]),
                })
                .collect(),
        }
    }

    struct ScriptedSource {
        /// set id -> remaining failures before a fetch succeeds
        failures: Mutex<HashMap<u32, u32>>,
        details: HashMap<u32, BeatmapsetDetail>,
        events: Vec<NominationEvent>,
    }

    impl ScriptedSource {
        fn new(details: Vec<BeatmapsetDetail>) -> Self {
            Self {
                failures: Mutex::new(HashMap::new()),
                details: details.into_iter().map(|d| (d.id, d)).collect(),
                events: Vec::new(),
            }
        }

        fn fail_times(mut self, set_id: u32, times: u32) -> Self {
            self.failures.get_mut().insert(set_id, times);

            self
        }
    }

    #[async_trait]
    impl DetailSource for ScriptedSource {
        async fn beatmapset(&self, set_id: u32) -> Result<BeatmapsetDetail, ClientError> {
            let mut failures = self.failures.lock();

            if let Some(remaining) = failures.get_mut(&set_id) {
                if *remaining > 0 {
                    *remaining -= 1;

                    return Err(ClientError::ServerError(503));
                }
            }

            self.details
                .get(&set_id)
                .cloned()
                .ok_or(ClientError::NotFound)
        }

        async fn nomination_events(&self, _: &str) -> Result<NominationEvents, ClientError> {
            Ok(NominationEvents {
                events: self
                    .events
                    .iter()
                    .map(|event| NominationEvent {
                        user: event.user.as_ref().map(|u| EventUser { id: u.id }),
                        created_at: event.created_at.clone(),
                        beatmapset: event
                            .beatmapset
                            .as_ref()
                            .map(|set| EventBeatmapset { id: set.id }),
                        discussion: None,
                    })
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn gd_and_host_modes_from_owners() {
        let maps = vec![
            diff(Some(5), &[], GameMode::Osu),
            diff(Some(99), &[5, 7], GameMode::Taiko),
            diff(Some(7), &[], GameMode::Taiko),
        ];

        let source = ScriptedSource::new(vec![detail(101, 5, maps, &[8])]);
        let facts = process_set(&source, &shallow(101, 5)).await;

        assert_eq!(facts.host_id, Some(5));
        assert_eq!(
            facts.host_modes,
            BTreeSet::from([GameMode::Osu, GameMode::Taiko])
        );
        assert_eq!(
            facts.gd_modes[&7],
            BTreeSet::from([GameMode::Taiko])
        );
        assert_eq!(facts.nominations.len(), 1);
        assert_eq!(&*facts.date, "2021-06-01");
    }

    #[tokio::test]
    async fn empty_nominations_fall_back_to_events() {
        let mut source = ScriptedSource::new(vec![detail(101, 5, Vec::new(), &[])]);

        source.events = vec![
            NominationEvent {
                user: Some(EventUser { id: 7 }),
                created_at: Some(Box::from("2021-06-02T10:00:00+00:00")),
                beatmapset: Some(EventBeatmapset { id: 101 }),
                discussion: None,
            },
            NominationEvent {
                user: Some(EventUser { id: 9 }),
                created_at: None,
                beatmapset: Some(EventBeatmapset { id: 999 }),
                discussion: None,
            },
        ];

        let facts = process_set(&source, &shallow(101, 5)).await;

        assert_eq!(facts.nominations.len(), 1);
        assert_eq!(facts.nominations[0].user_id, 7);
    }

    #[tokio::test]
    async fn degraded_set_recovers_in_retry_pass() {
        let sets = vec![shallow(101, 5), shallow(102, 6)];

        let source = ScriptedSource::new(vec![
            detail(101, 5, Vec::new(), &[7]),
            detail(102, 6, Vec::new(), &[7]),
        ])
        .fail_times(102, 1);

        let cancel = CancelToken::new();
        let progress = |_: Progress| ();

        let (facts, failed) = deep_fetch_all(&source, &sets, &progress, &cancel)
            .await
            .unwrap();

        assert_eq!(facts.len(), 2);
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn retry_pass_progress_never_regresses() {
        let sets = vec![shallow(101, 5), shallow(102, 6), shallow(103, 7)];

        let source = ScriptedSource::new(vec![
            detail(101, 5, Vec::new(), &[8]),
            detail(102, 6, Vec::new(), &[8]),
            detail(103, 7, Vec::new(), &[8]),
        ])
        .fail_times(102, 1);

        let cancel = CancelToken::new();
        let events: Mutex<Vec<Progress>> = Mutex::new(Vec::new());
        let progress = |event: Progress| events.lock().push(event);

        deep_fetch_all(&source, &sets, &progress, &cancel)
            .await
            .unwrap();

        let done_values: Vec<usize> = events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Progress::DeepScanning { done, .. } => Some(*done),
                _ => None,
            })
            .collect();

        assert!(!done_values.is_empty());
        assert!(done_values.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(done_values.last(), Some(&sets.len()));
    }

    #[tokio::test]
    async fn permanently_failing_set_is_reported() {
        let sets = vec![shallow(101, 5), shallow(102, 6)];

        let source = ScriptedSource::new(vec![
            detail(101, 5, Vec::new(), &[7]),
            detail(102, 6, Vec::new(), &[7]),
        ])
        .fail_times(102, 10);

        let cancel = CancelToken::new();
        let progress = |_: Progress| ();

        let (facts, failed) = deep_fetch_all(&source, &sets, &progress, &cancel)
            .await
            .unwrap();

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].set_id, 101);
        assert_eq!(failed, vec![102]);
    }

    #[tokio::test]
    async fn cancelled_pool_issues_no_further_work() {
        let sets = vec![shallow(101, 5)];
        let source = ScriptedSource::new(vec![detail(101, 5, Vec::new(), &[7])]);

        let cancel = CancelToken::new();
        cancel.cancel();

        let progress = |_: Progress| ();
        let res = deep_fetch_all(&source, &sets, &progress, &cancel).await;

        assert!(matches!(res, Err(ClientError::Cancelled)));
    }
}
