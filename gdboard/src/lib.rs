#[macro_use]
extern crate tracing;

#[macro_use]
extern crate eyre;

pub mod core;
pub mod scan;
pub mod snapshot;
pub mod user;

/// Terminal state of a scan driver. A cancelled run is distinguished
/// from both success and failure so callers never mistake it for an
/// empty result.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}
