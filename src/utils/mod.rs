pub mod config;
pub mod logger;
pub mod options_toml;

pub use logger::setup_logging;
