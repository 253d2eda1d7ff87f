use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use eyre::{Result, WrapErr};
use gdboard_client::Client;
use gdboard_model::LeaderboardSnapshot;
use parking_lot::Mutex;
use tokio::fs;

use crate::core::Config;

/// How long a fetched remote snapshot is served before re-fetching.
const REMOTE_TTL: Duration = Duration::from_secs(60 * 60);

/// Read-side access to the published leaderboard. When a remote URL is
/// configured the snapshot is pulled from there and cached for an hour;
/// the locally written file is the fallback either way.
#[derive(Default)]
pub struct SnapshotStore {
    remote: Mutex<Option<CachedRemote>>,
}

struct CachedRemote {
    snapshot: Arc<LeaderboardSnapshot>,
    fetched_at: Instant,
}

impl SnapshotStore {
    pub async fn load(&self, client: &Client) -> Result<Arc<LeaderboardSnapshot>> {
        let config = Config::get();

        if let Some(url) = config.snapshot_url.as_deref() {
            {
                let cached = self.remote.lock();

                if let Some(remote) = cached.as_ref() {
                    if remote.fetched_at.elapsed() < REMOTE_TTL {
                        return Ok(Arc::clone(&remote.snapshot));
                    }
                }
            }

            match client.remote_snapshot(url).await {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);

                    *self.remote.lock() = Some(CachedRemote {
                        snapshot: Arc::clone(&snapshot),
                        fetched_at: Instant::now(),
                    });

                    return Ok(snapshot);
                }
                Err(err) => warn!(%err, "Remote snapshot unavailable, using local file"),
            }
        }

        self.load_local().await
    }

    async fn load_local(&self) -> Result<Arc<LeaderboardSnapshot>> {
        let path = Config::get().paths.leaderboard();

        let bytes = fs::read(&path)
            .await
            .wrap_err_with(|| format!("No leaderboard snapshot at {path:?}"))?;

        let snapshot =
            serde_json::from_slice(&bytes).wrap_err("Failed to parse leaderboard snapshot")?;

        Ok(Arc::new(snapshot))
    }
}
