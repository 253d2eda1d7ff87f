mod config;

pub mod logging;

pub use self::config::Config;
