use serde::Serialize;

/// Structured progress event emitted by the scan drivers. Consumers
/// (CLI, job-status endpoints) render these deterministically instead
/// of parsing message strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Progress {
    Authenticating,
    LoadingCache,
    CacheLoaded { scanned: usize },
    SearchingCorpus { fetched: usize },
    CorpusReady { total: usize, new: usize },
    FetchingUserSets { fetched: usize },
    DeepScanning { done: usize, total: usize },
    RetryingFailures { failed: usize },
    ResolvingNames { done: usize, total: usize },
    BuildingLeaderboards,
    SavingCache,
    Finished,
}

pub type ProgressFn<'a> = &'a (dyn Fn(Progress) + Send + Sync);
