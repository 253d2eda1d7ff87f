use std::path::Path;

use eyre::{Result, WrapErr};
use gdboard_model::{ScanCache, CACHE_VERSION};
use tokio::fs;

/// Loads the scan cache, or a fresh one when the file is missing,
/// unreadable, or from an incompatible schema version. A broken cache
/// only ever costs a full rescan, never a startup failure.
pub async fn load(path: &Path) -> ScanCache {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(?path, %err, "No scan cache, starting fresh");

            return ScanCache::default();
        }
    };

    let cache: ScanCache = match serde_json::from_slice(&bytes) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(?path, %err, "Failed to parse scan cache, starting fresh");

            return ScanCache::default();
        }
    };

    if cache.cache_version != CACHE_VERSION {
        info!(
            found = cache.cache_version,
            expected = CACHE_VERSION,
            "Scan cache version mismatch, starting fresh"
        );

        return ScanCache::default();
    }

    cache
}

/// Persists the cache atomically through a sibling temp file so a crash
/// mid-write never leaves a truncated cache behind.
pub async fn save(path: &Path, cache: &ScanCache) -> Result<()> {
    let json = serde_json::to_vec(cache).wrap_err("Failed to serialize scan cache")?;

    write_atomic(path, &json).await
}

pub(super) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .wrap_err_with(|| format!("Failed to create directory {parent:?}"))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    fs::write(&tmp, bytes)
        .await
        .wrap_err_with(|| format!("Failed to write {tmp:?}"))?;

    fs::rename(&tmp, path)
        .await
        .wrap_err_with(|| format!("Failed to move {tmp:?} into place"))?;

    Ok(())
}
