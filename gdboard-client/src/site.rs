use tokio::time::Duration;

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub(crate) enum Site {
    OsuToken,
    OsuSearch,
    OsuBeatmapset,
    OsuUser,
    OsuEvents,
    Artifact,
}

impl Site {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::OsuToken => "OsuToken",
            Self::OsuSearch => "OsuSearch",
            Self::OsuBeatmapset => "OsuBeatmapset",
            Self::OsuUser => "OsuUser",
            Self::OsuEvents => "OsuEvents",
            Self::Artifact => "Artifact",
        }
    }

    /// Per-request deadline. Deep fetches get the most headroom, the
    /// published artifact is only worth a short wait before falling
    /// back to the local file.
    pub(crate) fn timeout(self) -> Duration {
        match self {
            Self::OsuToken => Duration::from_secs(10),
            Self::OsuBeatmapset => Duration::from_secs(20),
            Self::Artifact => Duration::from_secs(3),
            _ => Duration::from_secs(15),
        }
    }
}
