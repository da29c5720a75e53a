//! File metadata queries and filtered directory listing.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use log::warn;

use crate::paths::MAX_PATH_LENGTH;

/// Snapshot of one stat call. `timestamp` is mtime in seconds since epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub exists: bool,
    pub is_file: bool,
    pub is_dir: bool,
    pub size: u64,
    pub timestamp: u64,
}

impl FileInfo {
    pub fn absent() -> FileInfo {
        FileInfo::default()
    }
}

/// Stat `path`. A missing or inaccessible file yields an absent record, not
/// an error.
pub fn get_file_info(path: &str) -> FileInfo {
    match fs::metadata(path) {
        Ok(meta) => {
            let timestamp = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            FileInfo {
                exists: true,
                is_file: meta.is_file(),
                is_dir: meta.is_dir(),
                size: meta.len(),
                timestamp,
            }
        }
        Err(_) => FileInfo::absent(),
    }
}

/// Filter out noise entries that only serve to cause DAG regeneration:
/// `.`, `..`, vim `.foo.swp` files, our own `.tundra2.*` files and emacs
/// `foo~` backups.
pub fn should_filter(name: &str) -> bool {
    if name == "." || name == ".." {
        return true;
    }
    if name.starts_with('.') && name.ends_with(".swp") && name.len() >= 4 {
        return true;
    }
    if name.starts_with(".tundra2.") {
        return true;
    }
    if name.len() > 1 && name.ends_with('~') {
        return true;
    }
    false
}

/// List `dir`, invoking `callback` with each surviving entry's info and bare
/// name. Entries whose full path would exceed the path limit are skipped with
/// a warning, leaving the listing partial.
pub fn list_directory<F>(dir: &str, mut callback: F)
where
    F: FnMut(&FileInfo, &str),
{
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if should_filter(name) {
            continue;
        }

        if name.len() + dir.len() + 2 >= MAX_PATH_LENGTH {
            warn!("{}: name too long", name);
            continue;
        }

        let full = Path::new(dir).join(name);
        let info = get_file_info(&full.to_string_lossy());
        callback(&info, name);
    }
}

/// Create a single directory level.
pub fn make_directory(dir: &str) -> bool {
    fs::create_dir(dir).is_ok()
}

/// Remove a file or an empty directory; true on success.
pub fn remove_file_or_dir(path: &str) -> bool {
    let info = get_file_info(path);
    if info.is_dir {
        fs::remove_dir(path).is_ok()
    } else {
        fs::remove_file(path).is_ok()
    }
}
