use std::{env, path::PathBuf};

use eyre::Result;
use once_cell::sync::OnceCell;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug)]
pub struct Config {
    pub tokens: Tokens,
    pub paths: Paths,
    /// Published snapshot artifact to prefer over the local file.
    pub snapshot_url: Option<Box<str>>,
}

#[derive(Debug)]
pub struct Tokens {
    pub osu_client_id: u64,
    pub osu_client_secret: Box<str>,
}

#[derive(Debug)]
pub struct Paths {
    pub data: PathBuf,
}

impl Paths {
    pub fn scan_cache(&self) -> PathBuf {
        self.data.join("leaderboard_cache.json")
    }

    pub fn leaderboard(&self) -> PathBuf {
        self.data.join("leaderboard.json")
    }
}

impl Config {
    pub fn get() -> &'static Self {
        CONFIG.get().expect("`Config::init` must be called first")
    }

    pub fn init() -> Result<()> {
        let config = Config {
            tokens: Tokens {
                osu_client_id: env_var("OSU_CLIENT_ID")?,
                osu_client_secret: env_var("OSU_CLIENT_SECRET")?,
            },
            paths: Paths {
                data: env_var("DATA_PATH")?,
            },
            snapshot_url: env_var_opt("LEADERBOARD_URL")?,
        };

        if CONFIG.set(config).is_err() {
            warn!("CONFIG was already set");
        }

        Ok(())
    }
}

trait EnvKind: Sized {
    const EXPECTED: &'static str;

    fn from_str(s: String) -> Result<Self, String>;
}

macro_rules! env_kind {
    ($($ty:ty: |$arg:ident| $impl:block,)*) => {
        $(
            impl EnvKind for $ty {
                const EXPECTED: &'static str = stringify!($ty);

                fn from_str($arg: String) -> Result<Self, String> {
                    $impl
                }
            }
        )*
    };
}

env_kind! {
    Box<str>: |s| { Ok(s.into_boxed_str()) },
    u64: |s| { s.parse().map_err(|_| s) },
    PathBuf: |s| { s.parse().map_err(|_| s) },
}

fn env_var<T: EnvKind>(name: &str) -> Result<T> {
    let value = env::var(name).map_err(|_| eyre!("missing env variable `{name}`"))?;

    parse_env(name, value)
}

fn env_var_opt<T: EnvKind>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => parse_env(name, value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_env<T: EnvKind>(name: &str, value: String) -> Result<T> {
    T::from_str(value).map_err(|value| {
        eyre!(
            "failed to parse env variable `{name}={value}`; expected {expected}",
            expected = T::EXPECTED
        )
    })
}
