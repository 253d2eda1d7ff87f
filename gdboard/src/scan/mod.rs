use eyre::{Result, WrapErr};
use gdboard_client::{Client, ClientError};
use gdboard_model::{LeaderboardSnapshot, Progress, ProgressFn};
use gdboard_util::CancelToken;

use crate::{Outcome, core::Config};

pub mod aggregate;
pub mod cache;
pub mod corpus;
pub mod deep;
pub mod leaderboard;
pub mod names;

use aggregate::Counters;
use names::NameResolver;

/// One full incremental scan: search the corpus, deep-fetch whatever
/// the cache has not seen, fold the results into the running totals,
/// persist them, and publish a fresh leaderboard snapshot.
///
/// Cancellation before the cache save discards all partial results;
/// past that point the merged totals are durable and only the snapshot
/// publication is skipped.
pub async fn global_scan(
    client: &Client,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Outcome<LeaderboardSnapshot>> {
    let config = Config::get();

    progress(Progress::Authenticating);
    client.ensure_token().await.wrap_err("Authentication failed")?;

    progress(Progress::LoadingCache);

    let cache_path = config.paths.scan_cache();
    let mut counters = Counters::from_cache(cache::load(&cache_path).await);

    progress(Progress::CacheLoaded {
        scanned: counters.scanned_ids.len(),
    });

    let corpus = match corpus::search_all(client, progress, cancel).await {
        Ok(corpus) => corpus,
        Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
        Err(err) => return Err(err).wrap_err("Corpus search failed"),
    };

    // An empty corpus means the search itself is broken; proceeding
    // would publish an empty leaderboard over a good one.
    if corpus.is_empty() {
        bail!("Corpus search returned no beatmapsets");
    }

    let resolver = NameResolver::default();

    resolver.prime(corpus.iter().filter_map(|bset| {
        let host_id = bset.host_id?;
        let creator = bset.creator.clone()?;

        Some((host_id, creator))
    }));

    let new_sets: Vec<_> = corpus
        .into_iter()
        .filter(|bset| !counters.scanned_ids.contains(&bset.id))
        .collect();

    progress(Progress::CorpusReady {
        total: counters.scanned_ids.len() + new_sets.len(),
        new: new_sets.len(),
    });

    if !new_sets.is_empty() {
        info!(new = new_sets.len(), "Deep-fetching unscanned beatmapsets");

        let (facts, failed) =
            match deep::deep_fetch_all(client, &new_sets, progress, cancel).await {
                Ok(res) => res,
                Err(ClientError::Cancelled) => return Ok(Outcome::Cancelled),
                Err(err) => return Err(err).wrap_err("Deep fetch failed"),
            };

        if !failed.is_empty() {
            warn!(
                failed = failed.len(),
                "Some beatmapsets failed both fetch passes, retrying next run"
            );
        }

        for fact in &facts {
            counters.merge(fact);
        }
    }

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    progress(Progress::SavingCache);

    let cache = counters.into_cache();

    cache::save(&cache_path, &cache)
        .await
        .wrap_err("Failed to persist scan cache")?;

    let counters = Counters::from_cache(cache);

    let outcome = resolver
        .resolve_all(client, counters.referenced_user_ids(), progress, cancel)
        .await;

    if outcome.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }

    progress(Progress::BuildingLeaderboards);

    let snapshot = leaderboard::build(&counters, &resolver);
    let json = serde_json::to_vec_pretty(&snapshot).wrap_err("Failed to serialize snapshot")?;

    cache::write_atomic(&config.paths.leaderboard(), &json)
        .await
        .wrap_err("Failed to persist leaderboard snapshot")?;

    progress(Progress::Finished);

    info!(
        sets = snapshot.total_sets_scanned,
        duos = snapshot.total_duos,
        "Scan finished"
    );

    Ok(Outcome::Completed(snapshot))
}
