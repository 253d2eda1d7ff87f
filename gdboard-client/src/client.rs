use bytes::Bytes;
use eyre::{Result, WrapErr};
use hyper::{
    Body, Method, Request, Response, StatusCode,
    client::{Client as HyperClient, HttpConnector},
    header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use leaky_bucket_lite::LeakyBucket;
use serde::Serialize;
use tokio::time::{Duration, sleep, timeout};

use crate::{ClientError, MY_USER_AGENT, site::Site, token::TokenState};

pub(crate) type InnerClient = HyperClient<HttpsConnector<HttpConnector>, Body>;

/// Attempts per request; 429/5xx/timeout back off exponentially
/// between them.
const RETRY_ATTEMPTS: u32 = 4;

pub struct Client {
    pub(crate) client: InnerClient,
    pub(crate) token: TokenState,
    pub(crate) client_id: u64,
    pub(crate) client_secret: Box<str>,
    ratelimiters: [LeakyBucket; 6],
}

impl Client {
    pub fn new(client_id: u64, client_secret: &str) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = HyperClient::builder().build(https);

        let ratelimiter = |per_second| {
            LeakyBucket::builder()
                .max(per_second)
                .tokens(per_second)
                .refill_interval(Duration::from_millis(1000 / per_second as u64))
                .refill_amount(1)
                .build()
        };

        let ratelimiters = [
            ratelimiter(1), // OsuToken
            ratelimiter(5), // OsuSearch
            ratelimiter(8), // OsuBeatmapset
            ratelimiter(8), // OsuUser
            ratelimiter(2), // OsuEvents
            ratelimiter(1), // Artifact
        ];

        Self {
            client,
            token: TokenState::default(),
            client_id,
            client_secret: Box::from(client_secret),
            ratelimiters,
        }
    }

    async fn ratelimit(&self, site: Site) {
        self.ratelimiters[site as usize].acquire_one().await
    }

    pub(crate) async fn make_get_request(
        &self,
        url: impl AsRef<str>,
        site: Site,
        auth: Option<&str>,
    ) -> Result<Bytes, ClientError> {
        let url = url.as_ref();
        trace!("GET request to url {url}");

        let mut attempt = 0;

        loop {
            let mut req = Request::builder()
                .uri(url)
                .method(Method::GET)
                .header(USER_AGENT, MY_USER_AGENT);

            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }

            let req = req
                .body(Body::empty())
                .wrap_err("failed to build GET request")?;

            match self.send_request(req, site).await {
                Err(err) if err.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                    let backoff = Duration::from_secs(1u64 << attempt);
                    attempt += 1;

                    debug!(
                        site = site.as_str(),
                        %err,
                        "Transient request failure, retrying in {backoff:?} \
                        (attempt {attempt}/{RETRY_ATTEMPTS})",
                    );

                    sleep(backoff).await;
                }
                res => return res,
            }
        }
    }

    pub(crate) async fn make_post_form_request<F: Serialize>(
        &self,
        url: impl AsRef<str>,
        site: Site,
        form: &F,
    ) -> Result<Bytes, ClientError> {
        let url = url.as_ref();
        trace!("POST form request to url {url}");

        let body =
            serde_urlencoded::to_string(form).wrap_err("failed to urlencode POST form body")?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(USER_AGENT, MY_USER_AGENT)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .wrap_err("failed to build POST request")?;

        self.send_request(req, site).await
    }

    async fn send_request(&self, req: Request<Body>, site: Site) -> Result<Bytes, ClientError> {
        self.ratelimit(site).await;

        let uri = req.uri().to_string();
        let response_fut = self.client.request(req);

        match timeout(site.timeout(), response_fut).await {
            Ok(Ok(response)) => Self::error_for_status(response, &uri).await,
            Ok(Err(err)) => {
                Err(eyre::Report::new(err)
                    .wrap_err(format!("failed to receive response of url {uri}"))
                    .into())
            }
            Err(_) => Err(ClientError::TimedOut),
        }
    }

    async fn error_for_status(response: Response<Body>, url: &str) -> Result<Bytes, ClientError> {
        let status = response.status();

        match status {
            _ if status.is_success() => hyper::body::to_bytes(response.into_body())
                .await
                .wrap_err("failed to collect response bytes")
                .map_err(ClientError::Report),
            StatusCode::BAD_REQUEST => Err(ClientError::BadRequest),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(ClientError::Ratelimited),
            _ if status.is_server_error() => Err(ClientError::ServerError(status.as_u16())),
            _ => Err(eyre!("failed with status code {status} when requesting url {url}").into()),
        }
    }
}
