mod cache;
mod mode;
mod osu;
mod progress;
mod snapshot;

pub use self::{
    cache::{CACHE_VERSION, EntityCounter, NominatorPair, ScanCache},
    mode::GameMode,
    osu::{
        Beatmap, BeatmapOwner, BeatmapsetDetail, BeatmapsetRef, BeatmapsetSearchPage,
        CurrentNomination, EventBeatmap, EventBeatmapset, EventDiscussion, EventUser,
        NominationEvent, NominationEvents, OsuToken, OsuUser,
    },
    progress::{Progress, ProgressFn},
    snapshot::{DuoEntry, LeaderboardSnapshot, UserEntry},
};
