//! Thread-safe memoization of stat results.
//!
//! A small fixed number of read/write locks shard the table by path hash.
//! Entries never leave the cache during a run; they only change value or
//! dirty state. Completed actions mark their outputs dirty so the next stat
//! goes back to the file system.

use std::sync::RwLock;

use crate::fileinfo::{FileInfo, get_file_info};
use crate::hash::djb2_hash_path;
use crate::hashtable::HashTable;
use crate::stats::Stats;

const SHARD_COUNT: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    info: FileInfo,
    dirty: bool,
}

pub struct StatCache {
    shards: [RwLock<HashTable<Entry>>; SHARD_COUNT],
}

impl Default for StatCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatCache {
    pub fn new() -> StatCache {
        StatCache {
            shards: std::array::from_fn(|_| RwLock::new(HashTable::for_paths())),
        }
    }

    fn shard(&self, hash: u32) -> &RwLock<HashTable<Entry>> {
        &self.shards[(hash as usize) & (SHARD_COUNT - 1)]
    }

    /// Stat `path`, consulting the cache first. A dirty entry is re-stat'd.
    /// Two threads racing to insert the same key both stat the same file and
    /// converge on the same value.
    pub fn stat(&self, path: &str, hash: u32, stats: &Stats) -> FileInfo {
        {
            let shard = self.shard(hash).read().unwrap();
            match shard.lookup(hash, path) {
                Some(entry) if !entry.dirty => {
                    Stats::bump(&stats.stat_cache_hits);
                    return entry.info;
                }
                Some(_) => Stats::bump(&stats.stat_cache_dirty),
                None => Stats::bump(&stats.stat_cache_misses),
            }
        }

        let info = get_file_info(path);

        let mut shard = self.shard(hash).write().unwrap();
        shard.insert(hash, path, Entry { info, dirty: false });
        info
    }

    /// Stat by path alone, hashing it here.
    pub fn stat_path(&self, path: &str, stats: &Stats) -> FileInfo {
        self.stat(path, djb2_hash_path(path), stats)
    }

    /// Flag a cached entry so the next stat refreshes it. A path that was
    /// never stat'd needs no mark.
    pub fn mark_dirty(&self, path: &str, hash: u32) {
        let mut shard = self.shard(hash).write().unwrap();
        if let Some(entry) = shard.lookup_mut(hash, path) {
            entry.dirty = true;
        }
    }
}
