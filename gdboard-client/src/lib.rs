#[macro_use]
extern crate eyre;

#[macro_use]
extern crate tracing;

mod client;
mod error;
mod osu;
mod pagination;
mod site;
mod token;

pub use self::{
    client::Client,
    error::ClientError,
    osu::UserSetsKind,
    pagination::{CURSOR_PAGE_CAP, fetch_cursor_pages, fetch_offset_pages},
};

static MY_USER_AGENT: &str = env!("CARGO_PKG_NAME");

pub(crate) const OSU_API_BASE: &str = "https://osu.ppy.sh/api/v2";
pub(crate) const OSU_TOKEN_URL: &str = "https://osu.ppy.sh/oauth/token";
