use serde::Deserialize;

use crate::mode::GameMode;

/// One page of the global `/beatmapsets/search` endpoint. The cursor
/// disappears from the payload once the last page is reached.
#[derive(Debug, Deserialize)]
pub struct BeatmapsetSearchPage {
    #[serde(default)]
    pub beatmapsets: Vec<BeatmapsetRef>,
    #[serde(default)]
    pub cursor_string: Option<Box<str>>,
}

/// Shallow beatmapset data as returned by search pagination. Only the
/// fields the scan derives counts from are kept.
#[derive(Clone, Debug, Deserialize)]
pub struct BeatmapsetRef {
    pub id: u32,
    /// The set host. Absent only on degraded payloads.
    #[serde(default, rename = "user_id")]
    pub host_id: Option<u32>,
    #[serde(default)]
    pub creator: Option<Box<str>>,
    #[serde(default)]
    pub artist: Box<str>,
    #[serde(default)]
    pub title: Box<str>,
    #[serde(default)]
    pub ranked_date: Option<Box<str>>,
    #[serde(default)]
    pub last_updated: Option<Box<str>>,
    #[serde(default)]
    pub status: Box<str>,
}

impl BeatmapsetRef {
    /// Ranked date if present, otherwise the last update; the date
    /// portion only. Empty when neither is known.
    pub fn date(&self) -> &str {
        self.ranked_date
            .as_deref()
            .or(self.last_updated.as_deref())
            .map(gdboard_util::datetime::date_only)
            .unwrap_or_default()
    }
}

/// Full beatmapset detail from `/beatmapsets/{id}`, including owners
/// and the current nomination state. Also covers the per-user listing
/// payloads, which carry `beatmaps` but no nominations.
#[derive(Clone, Debug, Deserialize)]
pub struct BeatmapsetDetail {
    pub id: u32,
    #[serde(default, rename = "user_id")]
    pub host_id: Option<u32>,
    #[serde(default)]
    pub ranked_date: Option<Box<str>>,
    #[serde(default)]
    pub last_updated: Option<Box<str>>,
    #[serde(default)]
    pub status: Box<str>,
    #[serde(default)]
    pub beatmaps: Vec<Beatmap>,
    #[serde(default)]
    pub current_nominations: Vec<CurrentNomination>,
}

impl BeatmapsetDetail {
    pub fn date(&self) -> &str {
        self.ranked_date
            .as_deref()
            .or(self.last_updated.as_deref())
            .map(gdboard_util::datetime::date_only)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Beatmap {
    pub id: u32,
    #[serde(default)]
    pub mode: GameMode,
    /// The difficulty's sole creator; superseded by `owners` when the
    /// API provides an explicit owner list.
    #[serde(default)]
    pub user_id: Option<u32>,
    #[serde(default)]
    pub owners: Vec<BeatmapOwner>,
    #[serde(default)]
    pub last_updated: Option<Box<str>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BeatmapOwner {
    pub id: u32,
    #[serde(default)]
    pub username: Option<Box<str>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CurrentNomination {
    pub user_id: u32,
    #[serde(default)]
    pub rulesets: Option<Vec<GameMode>>,
}

/// Response of `/beatmapsets/events?types[]=nominate`, the historical
/// fallback for sets whose current nomination state was wiped.
#[derive(Debug, Default, Deserialize)]
pub struct NominationEvents {
    #[serde(default)]
    pub events: Vec<NominationEvent>,
}

#[derive(Debug, Deserialize)]
pub struct NominationEvent {
    #[serde(default)]
    pub user: Option<EventUser>,
    #[serde(default)]
    pub created_at: Option<Box<str>>,
    #[serde(default)]
    pub beatmapset: Option<EventBeatmapset>,
    #[serde(default)]
    pub discussion: Option<EventDiscussion>,
}

impl NominationEvent {
    pub fn beatmapset_id(&self) -> Option<u32> {
        self.beatmapset.as_ref().map(|set| set.id)
    }

    pub fn nominator_id(&self) -> Option<u32> {
        self.user.as_ref().map(|user| user.id)
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.discussion
            .as_ref()?
            .beatmap
            .as_ref()
            .map(|map| map.mode)
    }
}

#[derive(Debug, Deserialize)]
pub struct EventUser {
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub struct EventBeatmapset {
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub struct EventDiscussion {
    #[serde(default)]
    pub beatmap: Option<EventBeatmap>,
}

#[derive(Debug, Deserialize)]
pub struct EventBeatmap {
    #[serde(default)]
    pub mode: GameMode,
}

#[derive(Debug, Deserialize)]
pub struct OsuUser {
    pub id: u32,
    pub username: Box<str>,
}

/// Client credentials exchange response.
#[derive(Debug, Deserialize)]
pub struct OsuToken {
    pub access_token: Box<str>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
