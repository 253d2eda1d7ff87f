use gdboard_client::{Client, ClientError, fetch_cursor_pages, CURSOR_PAGE_CAP};
use gdboard_model::{BeatmapsetRef, Progress, ProgressFn};
use gdboard_util::{CancelToken, IntHasher};
use hashbrown::HashSet;

/// Ranked statuses the global scan covers. Qualified sets are included
/// so freshly nominated sets show up before they rank.
const STATUSES: [&str; 4] = ["ranked", "qualified", "loved", "approved"];

/// Walks the beatmapset search for every covered status and returns the
/// union, deduplicated by set id. Search results occasionally repeat a
/// set across adjacent pages while the index shifts underneath.
pub async fn search_all(
    client: &Client,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<Vec<BeatmapsetRef>, ClientError> {
    let mut seen: HashSet<u32, IntHasher> = HashSet::default();
    let mut corpus = Vec::new();

    for status in STATUSES {
        let pages = fetch_cursor_pages(CURSOR_PAGE_CAP, cancel, |cursor| async move {
            let page = client.beatmapset_search_page(status, cursor.as_deref()).await?;

            Ok((page.beatmapsets, page.cursor_string.map(String::from)))
        })
        .await?;

        debug!(status, sets = pages.len(), "Search status done");

        for bset in pages {
            if seen.insert(bset.id) {
                corpus.push(bset);
            }
        }

        progress(Progress::SearchingCorpus {
            fetched: corpus.len(),
        });
    }

    Ok(corpus)
}
