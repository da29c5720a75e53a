//! Persistent memoization of (path, mtime) → content digest.
//!
//! Records survive between runs in `.tundra2.digestcache`. A record is a hit
//! only while the file's mtime matches the one recorded at digest time.
//! Records that have not been touched for a week are dropped.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::debug;

use crate::binfmt::digest::DigestCacheView;
use crate::binfmt::writer::BinaryWriter;
use crate::binfmt::{DIGEST_MAGIC, commit_cache_file, map_frozen_file};
use crate::hash::HashDigest;
use crate::hashtable::HashTable;

/// Keep unused records this long.
pub const RETAIN_SECONDS: u64 = 7 * 24 * 60 * 60;

struct Record {
    content_digest: HashDigest,
    timestamp: u64,
    /// Updated on hit under the read lock; only read at save time, so the
    /// race with other readers is benign.
    access_time: AtomicU64,
}

pub struct DigestCache {
    table: RwLock<HashTable<Record>>,
    state_filename: PathBuf,
    /// One "now" snapshot per run; hits stamp records with this.
    access_time: u64,
}

pub fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl DigestCache {
    /// Load the frozen cache at `state_filename` (tolerated missing) and
    /// copy forward records accessed within the retention window.
    pub fn new(state_filename: &Path) -> DigestCache {
        let access_time = now_seconds();
        let cutoff = access_time.saturating_sub(RETAIN_SECONDS);
        let mut table = HashTable::for_paths();

        if let Some(mapping) = map_frozen_file(state_filename, DIGEST_MAGIC) {
            let view = DigestCacheView::new(mapping.bytes());
            for record in view.records() {
                if record.access_time < cutoff {
                    continue;
                }
                table.insert(
                    record.filename_hash,
                    record.filename,
                    Record {
                        content_digest: record.content_digest,
                        timestamp: record.timestamp,
                        access_time: AtomicU64::new(record.access_time),
                    },
                );
            }
            debug!("digest cache initialized -- {} entries", view.record_count());
        }

        DigestCache {
            table: RwLock::new(table),
            state_filename: state_filename.to_path_buf(),
            access_time,
        }
    }

    /// Cached digest for `filename`, valid only when `timestamp` matches the
    /// recorded mtime. A hit refreshes the record's access time.
    pub fn get(&self, filename: &str, hash: u32, timestamp: u64) -> Option<HashDigest> {
        let table = self.table.read().unwrap();
        let record = table.lookup(hash, filename)?;
        if record.timestamp != timestamp {
            return None;
        }
        record.access_time.store(self.access_time, Ordering::Relaxed);
        Some(record.content_digest)
    }

    /// Record a freshly computed digest.
    pub fn set(&self, filename: &str, hash: u32, timestamp: u64, digest: HashDigest) {
        let mut table = self.table.write().unwrap();
        if let Some(record) = table.lookup_mut(hash, filename) {
            record.timestamp = timestamp;
            record.content_digest = digest;
            record.access_time.store(self.access_time, Ordering::Relaxed);
        } else {
            table.insert(
                hash,
                filename,
                Record {
                    content_digest: digest,
                    timestamp,
                    access_time: AtomicU64::new(self.access_time),
                },
            );
        }
    }

    /// Serialize to `tmp_filename`, then rename over the real cache file.
    /// Records past the retention cutoff are dropped.
    pub fn save(&self, tmp_filename: &Path) -> Result<()> {
        let cutoff = self.access_time.saturating_sub(RETAIN_SECONDS);

        let mut writer = BinaryWriter::new();
        let main_seg = writer.add_segment();
        let array_seg = writer.add_segment();
        let string_seg = writer.add_segment();
        let array_pos = writer.position(array_seg);

        let table = self.table.read().unwrap();
        let mut records_out: i32 = 0;
        table.walk(|_, hash, path, record: &Record| {
            let access_time = record.access_time.load(Ordering::Relaxed);
            if access_time < cutoff {
                return;
            }
            writer.write_u64(array_seg, record.timestamp);
            writer.write_u64(array_seg, access_time);
            writer.write_u32(array_seg, hash);
            writer.write_bytes(array_seg, &record.content_digest.0);
            let string_pos = writer.position(string_seg);
            writer.write_pointer(array_seg, string_pos);
            writer.write_string_data(string_seg, path);
            writer.write_u32(array_seg, 0);
            writer.write_u32(array_seg, 0);
            records_out += 1;
        });

        writer.write_u32(main_seg, DIGEST_MAGIC);
        writer.write_i32(main_seg, records_out);
        if records_out == 0 {
            writer.write_null_pointer(main_seg);
        } else {
            writer.write_pointer(main_seg, array_pos);
        }

        commit_cache_file(writer, tmp_filename, &self.state_filename)
            .with_context(|| format!("saving digest cache to {}", self.state_filename.display()))
    }
}
