mod cancel;
mod hasher;

pub mod datetime;

pub use self::{
    cancel::CancelToken,
    hasher::{IntHash, IntHasher},
};
