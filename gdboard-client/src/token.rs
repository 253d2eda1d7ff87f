use std::{sync::Arc, time::Instant};

use gdboard_model::OsuToken;
use tokio::{sync::Mutex, time::Duration};

use crate::{Client, ClientError, OSU_TOKEN_URL, site::Site};

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Tokens without an `expires_in` are assumed to last a day.
const DEFAULT_EXPIRY: u64 = 86_400;

#[derive(Default)]
pub(crate) struct TokenState {
    inner: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    /// Prebuilt `Bearer <token>` header value.
    header: Arc<str>,
    expires_at: Instant,
}

impl Client {
    /// The current bearer header, exchanging client credentials if no
    /// token is cached or less than the safety margin remains. The
    /// mutex makes the exchange single-flight; concurrent callers wait
    /// and reuse the fresh token instead of issuing their own exchange.
    pub(crate) async fn access_token(&self) -> Result<Arc<str>, ClientError> {
        let mut guard = self.token.inner.lock().await;

        if let Some(token) = guard.as_ref() {
            if token.expires_at.saturating_duration_since(Instant::now()) > EXPIRY_MARGIN {
                return Ok(Arc::clone(&token.header));
            }
        }

        let token = self.exchange_token().await?;
        let header = Arc::clone(&token.header);
        *guard = Some(token);

        Ok(header)
    }

    /// Exchanges credentials eagerly so auth problems surface before
    /// any scanning work starts.
    pub async fn ensure_token(&self) -> Result<(), ClientError> {
        self.access_token().await.map(|_| ())
    }

    /// Force a new exchange after an unauthorized response. `stale` is
    /// the header the caller got rejected with; if another worker
    /// already replaced it, the cached token is returned as-is so
    /// racing 401s don't cause a token storm.
    pub async fn refresh_token(&self, stale: &str) -> Result<Arc<str>, ClientError> {
        let mut guard = self.token.inner.lock().await;

        if let Some(token) = guard.as_ref() {
            if &*token.header != stale {
                return Ok(Arc::clone(&token.header));
            }
        }

        info!("Access token rejected, exchanging a new one");
        *guard = None;

        let token = self.exchange_token().await?;
        let header = Arc::clone(&token.header);
        *guard = Some(token);

        Ok(header)
    }

    async fn exchange_token(&self) -> Result<CachedToken, ClientError> {
        let client_id = self.client_id.to_string();

        let form = [
            ("client_id", client_id.as_str()),
            ("client_secret", self.client_secret.as_ref()),
            ("grant_type", "client_credentials"),
            ("scope", "public"),
        ];

        let bytes = self
            .make_post_form_request(OSU_TOKEN_URL, Site::OsuToken, &form)
            .await
            .map_err(|err| ClientError::Auth(Box::new(err)))?;

        let token: OsuToken = serde_json::from_slice(&bytes).map_err(|err| {
            ClientError::Auth(Box::new(
                eyre::Report::new(err)
                    .wrap_err("failed to deserialize token exchange response")
                    .into(),
            ))
        })?;

        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRY);

        Ok(CachedToken {
            header: format!("Bearer {}", token.access_token).into(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        })
    }
}
