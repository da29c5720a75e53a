//! Per-input-file signatures.
//!
//! Most files sign with their mtime. Files whose extension is listed in the
//! DAG's digest-signing set are signed with a content digest instead, served
//! from the digest cache when the mtime is unchanged. Also home to the glob
//! signature used to validate DAG freshness against directory contents.

use std::io::Read;

use crate::digest_cache::DigestCache;
use crate::fileinfo::list_directory;
use crate::hash::{HashDigest, HashState, djb2_hash};
use crate::stat_cache::StatCache;
use crate::stats::Stats;

/// Signature value for files that do not exist.
const MISSING_FILE_MARKER: u64 = !0u64;

const DIGEST_READ_CHUNK: usize = 8192;

/// True when `filename`'s extension (with its dot) is in the digest-signing
/// extension hash set.
pub fn should_use_digest_sign(filename: &str, ext_hashes: &[u32]) -> bool {
    match filename.rfind('.') {
        Some(dot) => {
            let ext_hash = djb2_hash(&filename[dot..]);
            ext_hashes.contains(&ext_hash)
        }
        None => false,
    }
}

fn sign_with_timestamp(h: &mut HashState, stat_cache: &StatCache, filename: &str, hash: u32, stats: &Stats) {
    let info = stat_cache.stat(filename, hash, stats);
    if info.exists {
        h.add_integer(info.timestamp);
    } else {
        h.add_integer(MISSING_FILE_MARKER);
    }
}

/// Stream-hash the file contents.
pub fn compute_content_digest(filename: &str) -> Option<HashDigest> {
    let mut file = std::fs::File::open(filename).ok()?;
    let mut h = HashState::new();
    let mut buffer = [0u8; DIGEST_READ_CHUNK];
    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => h.update(&buffer[..n]),
            Err(_) => return None,
        }
    }
    Some(h.finalize())
}

fn sign_with_digest(
    h: &mut HashState,
    stat_cache: &StatCache,
    digest_cache: &DigestCache,
    filename: &str,
    hash: u32,
    stats: &Stats,
) {
    let info = stat_cache.stat(filename, hash, stats);
    if !info.exists {
        h.add_integer(MISSING_FILE_MARKER);
        return;
    }

    let digest = match digest_cache.get(filename, hash, info.timestamp) {
        Some(digest) => {
            Stats::bump(&stats.digest_cache_hits);
            digest
        }
        None => {
            Stats::bump(&stats.file_digest_count);
            match compute_content_digest(filename) {
                Some(digest) => {
                    digest_cache.set(filename, hash, info.timestamp, digest);
                    digest
                }
                None => {
                    h.add_string("<missing>");
                    return;
                }
            }
        }
    };

    h.update(&digest.0);
}

/// Fold one input file into a node's signature, dispatching on its
/// extension.
pub fn compute_file_signature(
    h: &mut HashState,
    stat_cache: &StatCache,
    digest_cache: &DigestCache,
    filename: &str,
    filename_hash: u32,
    digest_ext_hashes: &[u32],
    stats: &Stats,
) {
    if should_use_digest_sign(filename, digest_ext_hashes) {
        sign_with_digest(h, stat_cache, digest_cache, filename, filename_hash, stats);
    } else {
        sign_with_timestamp(h, stat_cache, filename, filename_hash, stats);
    }
}

/// Digest of a directory's listing: sorted directory names, then sorted file
/// names, each followed by a separator. Used to detect glob changes that
/// invalidate the DAG.
pub fn calculate_glob_signature(path: &str) -> HashDigest {
    let mut dirs: Vec<String> = Vec::new();
    let mut files: Vec<String> = Vec::new();

    list_directory(path, |info, name| {
        if info.is_dir {
            dirs.push(name.to_string());
        } else {
            files.push(name.to_string());
        }
    });

    dirs.sort();
    files.sort();

    let mut h = HashState::new();
    for name in dirs.iter().chain(files.iter()) {
        h.add_path(name);
        h.add_separator();
    }
    h.finalize()
}
