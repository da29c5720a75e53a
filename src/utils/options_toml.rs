//! Optional `tundra2.toml` defaults file.
//!
//! Settings here seed the driver options; flags the user passes explicitly
//! on the command line win.

use std::path::Path;

use log::{debug, warn};
use serde::Deserialize;

use super::config::OPTIONS_FILENAME;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionsFile {
    /// Worker thread count (including the master thread).
    pub threads: Option<usize>,
    /// Keep building after the first failed node.
    pub continue_on_error: Option<bool>,
    pub verbose: Option<bool>,
    pub quiet: Option<bool>,
    /// Override the DAG file name.
    pub dag_file: Option<String>,
}

/// Load `tundra2.toml` from `dir`, if present. Parse errors are reported and
/// treated as "no file".
pub fn load_options_toml(dir: &Path) -> Option<OptionsFile> {
    let path = dir.join(OPTIONS_FILENAME);
    let text = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<OptionsFile>(&text) {
        Ok(file) => {
            debug!("loaded options from {}", path.display());
            Some(file)
        }
        Err(err) => {
            warn!("{}: ignoring malformed options file: {}", path.display(), err);
            None
        }
    }
}
