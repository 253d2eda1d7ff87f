use std::future::Future;

use gdboard_util::CancelToken;
use tokio::time::{Duration, sleep};

use crate::ClientError;

/// Hard ceiling on cursor pages per status; the upstream search caps
/// out around here anyway. Exceeding it is logged and the partial
/// corpus returned, coverage resumes on the next run.
pub const CURSOR_PAGE_CAP: usize = 500;

/// Small fixed delay between pages to stay under the rate limit.
const PAGE_DELAY: Duration = Duration::from_millis(100);

/// Drains an offset/limit paginated listing. Terminates on a 404, an
/// empty page, or a short page; any other failure stops the loop and
/// returns what was gathered, except authentication failures and
/// cancellation which propagate.
pub async fn fetch_offset_pages<T, F, Fut>(
    limit: usize,
    cancel: &CancelToken,
    mut fetch_page: F,
) -> Result<Vec<T>, ClientError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ClientError>>,
{
    let mut items = Vec::new();
    let mut offset = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let page = match fetch_page(offset).await {
            Ok(page) => page,
            Err(ClientError::NotFound) => break,
            Err(err @ (ClientError::Auth(_) | ClientError::Cancelled)) => return Err(err),
            Err(err) => {
                warn!(%err, offset, "Stopping offset pagination early");

                break;
            }
        };

        if page.is_empty() {
            break;
        }

        let page_len = page.len();
        items.extend(page);

        if page_len < limit {
            break;
        }

        offset += page_len;
        sleep(PAGE_DELAY).await;
    }

    Ok(items)
}

/// Follows a `cursor_string` continuation until the server stops
/// returning one, up to `page_cap` pages. Cursor state lives entirely
/// within one call; there is no resume across runs.
pub async fn fetch_cursor_pages<T, F, Fut>(
    page_cap: usize,
    cancel: &CancelToken,
    mut fetch_page: F,
) -> Result<Vec<T>, ClientError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>), ClientError>>,
{
    let mut items = Vec::new();
    let mut cursor = None;
    let mut pages = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let (page, next_cursor) = match fetch_page(cursor.take()).await {
            Ok(page) => page,
            Err(ClientError::NotFound) => break,
            Err(err @ (ClientError::Auth(_) | ClientError::Cancelled)) => return Err(err),
            Err(err) => {
                warn!(%err, pages, "Stopping cursor pagination early");

                break;
            }
        };

        if page.is_empty() {
            break;
        }

        items.extend(page);
        pages += 1;

        match next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }

        if pages >= page_cap {
            warn!(pages, "Reached cursor page cap, corpus may be incomplete");

            break;
        }

        sleep(PAGE_DELAY).await;
    }

    Ok(items)
}
