//! Application configuration constants.
//! File names, tuning and thresholds in one place.

// ---- File names ----

/// The frozen build DAG, produced by the external generator.
pub const DAG_FILENAME: &str = ".tundra2.dag";
/// Previous-build state.
pub const STATE_FILENAME: &str = ".tundra2.state";
/// Persistent include-scan cache.
pub const SCAN_CACHE_FILENAME: &str = ".tundra2.scancache";
/// Persistent content-digest cache.
pub const DIGEST_CACHE_FILENAME: &str = ".tundra2.digestcache";

// Temporary filenames where we write data first. These are then renamed to
// commit.
pub const STATE_FILENAME_TMP: &str = ".tundra2.state.tmp";
pub const SCAN_CACHE_FILENAME_TMP: &str = ".tundra2.scancache.tmp";
pub const DIGEST_CACHE_FILENAME_TMP: &str = ".tundra2.digestcache.tmp";

/// Build script handed to the external DAG generator.
pub const BUILD_FILENAME: &str = "tundra.lua";

/// Optional options file read from the working directory.
pub const OPTIONS_FILENAME: &str = "tundra2.toml";

/// Signature trace written by --debug-signing.
pub const SIGN_DEBUG_FILENAME: &str = "signing-debug.txt";

// ---- Environment variables ----

/// Path to the external DAG generator binary.
pub const ENV_DAGTOOL: &str = "TUNDRA_DAGTOOL";
/// Home directory for support scripts, forwarded to the generator.
pub const ENV_HOME: &str = "TUNDRA_HOME";

// ---- Scheduling ----

/// A job reports progress once it has been running this long.
pub const SLOW_JOB_FIRST_REPORT_SECS: u64 = 5;
