use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// The four osu! rulesets. Serializes to the API's ruleset names,
/// including `fruits` for catch.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub enum GameMode {
    #[serde(rename = "osu")]
    Osu,
    #[serde(rename = "taiko")]
    Taiko,
    #[serde(rename = "fruits")]
    Catch,
    #[serde(rename = "mania")]
    Mania,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Osu => "osu",
            Self::Taiko => "taiko",
            Self::Catch => "fruits",
            Self::Mania => "mania",
        }
    }
}

impl Default for GameMode {
    fn default() -> Self {
        Self::Osu
    }
}

impl Display for GameMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
