use std::fmt::Write;

use bytes::Bytes;
use eyre::WrapErr;
use gdboard_model::{
    BeatmapsetDetail, BeatmapsetSearchPage, LeaderboardSnapshot, NominationEvents, OsuUser,
};

use crate::{Client, ClientError, OSU_API_BASE, site::Site};

/// The per-user beatmapset listing flavors consumed by the per-user
/// scan variants.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UserSetsKind {
    Ranked,
    Loved,
    Nominated,
    Guest,
}

impl UserSetsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ranked => "ranked",
            Self::Loved => "loved",
            Self::Nominated => "nominated",
            Self::Guest => "guest",
        }
    }
}

impl Client {
    /// One page of the global corpus search for the given rank status,
    /// sorted by ranked date descending.
    pub async fn beatmapset_search_page(
        &self,
        status: &str,
        cursor: Option<&str>,
    ) -> Result<BeatmapsetSearchPage, ClientError> {
        let mut query = vec![("s", status), ("sort", "ranked_desc")];

        if let Some(cursor) = cursor {
            query.push(("cursor_string", cursor));
        }

        let url = format!(
            "{OSU_API_BASE}/beatmapsets/search?{query}",
            query = encode_query(&query)?
        );

        let bytes = self.osu_get(&url, Site::OsuSearch).await?;

        parse_json(&bytes, "beatmapset search page")
    }

    /// Full beatmapset detail including owners and current nominations.
    pub async fn beatmapset(&self, set_id: u32) -> Result<BeatmapsetDetail, ClientError> {
        let url = format!("{OSU_API_BASE}/beatmapsets/{set_id}");
        let bytes = self.osu_get(&url, Site::OsuBeatmapset).await?;

        parse_json(&bytes, "beatmapset detail")
    }

    /// Historical nomination events from `min_date` onwards; fallback
    /// for ranked sets whose current nomination state was wiped.
    pub async fn nomination_events(&self, min_date: &str) -> Result<NominationEvents, ClientError> {
        let query = [("types[]", "nominate"), ("min_date", min_date)];

        let url = format!(
            "{OSU_API_BASE}/beatmapsets/events?{query}",
            query = encode_query(&query)?
        );

        let bytes = self.osu_get(&url, Site::OsuEvents).await?;

        parse_json(&bytes, "nomination events")
    }

    pub async fn user(&self, user_id: u32) -> Result<OsuUser, ClientError> {
        let url = format!("{OSU_API_BASE}/users/{user_id}");
        let bytes = self.osu_get(&url, Site::OsuUser).await?;

        parse_json(&bytes, "user")
    }

    /// Resolve a username-or-id input to a user. Tries the username key
    /// first and falls back to a plain id lookup for numeric input.
    pub async fn user_lookup(&self, input: &str) -> Result<OsuUser, ClientError> {
        let url = format!(
            "{OSU_API_BASE}/users/{input}/osu?key=username",
            input = encode_path_segment(input)
        );

        match self.osu_get(&url, Site::OsuUser).await {
            Ok(bytes) => parse_json(&bytes, "user"),
            Err(ClientError::NotFound) if input.bytes().all(|byte| byte.is_ascii_digit()) => {
                let url = format!("{OSU_API_BASE}/users/{input}");
                let bytes = self.osu_get(&url, Site::OsuUser).await?;

                parse_json(&bytes, "user")
            }
            Err(err) => Err(err),
        }
    }

    /// One offset page of a per-user beatmapset listing. The payload is
    /// a bare array of beatmapsets with their difficulties included.
    pub async fn user_beatmapsets_page(
        &self,
        user_id: u32,
        kind: UserSetsKind,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BeatmapsetDetail>, ClientError> {
        let url = format!(
            "{OSU_API_BASE}/users/{user_id}/beatmapsets/{kind}?limit={limit}&offset={offset}",
            kind = kind.as_str()
        );

        let bytes = self.osu_get(&url, Site::OsuUser).await?;

        parse_json(&bytes, "user beatmapsets page")
    }

    /// The published leaderboard artifact; unauthenticated and on a
    /// short timeout since there is a local fallback.
    pub async fn remote_snapshot(&self, url: &str) -> Result<LeaderboardSnapshot, ClientError> {
        let bytes = self.make_get_request(url, Site::Artifact, None).await?;

        parse_json(&bytes, "remote leaderboard snapshot")
    }

    /// Authenticated GET with a single refresh-and-retry on 401.
    async fn osu_get(&self, url: &str, site: Site) -> Result<Bytes, ClientError> {
        let auth = self.access_token().await?;

        match self.make_get_request(url, site, Some(&auth)).await {
            Err(ClientError::Unauthorized) => {
                let auth = self.refresh_token(&auth).await?;

                self.make_get_request(url, site, Some(&auth)).await
            }
            res => res,
        }
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    bytes: &Bytes,
    kind: &'static str,
) -> Result<T, ClientError> {
    serde_json::from_slice(bytes)
        .wrap_err_with(|| format!("failed to deserialize {kind}"))
        .map_err(ClientError::Report)
}

fn encode_query(pairs: &[(&str, &str)]) -> Result<String, ClientError> {
    serde_urlencoded::to_string(pairs)
        .wrap_err("failed to encode query string")
        .map_err(ClientError::Report)
}

/// Percent-encode a path segment; usernames may contain spaces and
/// other reserved characters.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());

    for byte in segment.bytes() {
        match byte {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }

    encoded
}

#[cfg(test)]
mod tests {
    use super::encode_path_segment;

    #[test]
    fn path_segment_encoding() {
        assert_eq!(encode_path_segment("plain_name-1.2~"), "plain_name-1.2~");
        assert_eq!(encode_path_segment("two words"), "two%20words");
        assert_eq!(encode_path_segment("[crz] #"), "%5Bcrz%5D%20%23");
    }
}
