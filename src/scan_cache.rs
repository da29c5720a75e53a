//! Persistent memoization of per-(file, scanner) include sets.
//!
//! Keys fold the source file's 64-bit path hash into the scanner's GUID, so
//! callers hash the path once and two different scanners over the same file
//! never collide. Lookups try the frozen (previous run) records first; those
//! are read-only and need no lock. Fresh scans go into a dynamic map guarded
//! by a read/write lock. Saving merges both sides in sorted key order,
//! refreshes access times for anything touched this run and drops frozen
//! records unused for a week.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::debug;

use crate::binfmt::scan::ScanView;
use crate::binfmt::writer::{BinaryLocator, BinaryWriter, SegmentId};
use crate::binfmt::{MappedFile, SCAN_MAGIC, commit_cache_file, map_frozen_file};
use crate::digest_cache::{RETAIN_SECONDS, now_seconds};
use crate::hash::{HashDigest, djb2_hash_path_64};
use crate::hashtable::HashTable;
use crate::merge::{MergeElem, traverse_sorted_arrays};
use crate::stats::Stats;
use crate::types::FileAndHash;

/// Key for one (source file, scanner) pair.
pub fn compute_scan_cache_key(filename: &str, scanner_guid: HashDigest) -> HashDigest {
    let mut key = scanner_guid;
    key.xor_first_word(djb2_hash_path_64(filename));
    key
}

struct ScanRecord {
    file_timestamp: u64,
    includes: Vec<FileAndHash>,
}

pub struct ScanCache {
    frozen: Option<MappedFile>,
    /// One flag per frozen record, set on hit so save treats the record as
    /// freshly accessed.
    frozen_access: Vec<AtomicBool>,
    dynamic: RwLock<HashMap<HashDigest, ScanRecord>>,
    state_filename: PathBuf,
}

impl ScanCache {
    /// Load the frozen cache at `state_filename`; a missing or invalid file
    /// just means an empty cache.
    pub fn new(state_filename: &Path) -> ScanCache {
        let frozen = map_frozen_file(state_filename, SCAN_MAGIC);
        let entry_count = frozen
            .as_ref()
            .map(|m| ScanView::new(m.bytes()).entry_count())
            .unwrap_or(0);
        if frozen.is_some() {
            debug!("scan cache initialized from frozen data - {} entries", entry_count);
        }

        let mut frozen_access = Vec::new();
        frozen_access.resize_with(entry_count, || AtomicBool::new(false));

        ScanCache {
            frozen,
            frozen_access,
            dynamic: RwLock::new(HashMap::new()),
            state_filename: state_filename.to_path_buf(),
        }
    }

    /// The cached include list for `key`, valid only when `timestamp` equals
    /// the mtime recorded at scan time.
    pub fn lookup(&self, key: &HashDigest, timestamp: u64, stats: &Stats) -> Option<Vec<FileAndHash>> {
        // Frozen records are read-only; no lock needed. Most data lands here
        // since header files rarely change.
        if let Some(mapping) = &self.frozen {
            let view = ScanView::new(mapping.bytes());
            if let Some(index) = view.find_key(key)
                && view.file_timestamp(index) == timestamp
            {
                let includes = view
                    .included_files(index)
                    .map(|(path, hash)| FileAndHash {
                        path: path.to_string(),
                        hash,
                    })
                    .collect();
                self.frozen_access[index].store(true, Ordering::Relaxed);
                Stats::bump(&stats.old_scan_cache_hits);
                return Some(includes);
            }
        }

        let dynamic = self.dynamic.read().unwrap();
        if let Some(record) = dynamic.get(key)
            && record.file_timestamp == timestamp
        {
            Stats::bump(&stats.new_scan_cache_hits);
            return Some(record.includes.clone());
        }

        Stats::bump(&stats.scan_cache_misses);
        None
    }

    /// Record a scan result. Races to insert the same include set are
    /// harmless; last writer wins.
    pub fn insert(&self, key: HashDigest, timestamp: u64, includes: Vec<FileAndHash>, stats: &Stats) {
        Stats::bump(&stats.scan_cache_inserts);
        let mut dynamic = self.dynamic.write().unwrap();
        dynamic.insert(
            key,
            ScanRecord {
                file_timestamp: timestamp,
                includes,
            },
        );
    }

    /// True when anything was inserted this run.
    pub fn is_dirty(&self) -> bool {
        !self.dynamic.read().unwrap().is_empty()
    }

    /// Write the union of frozen and dynamic records to `tmp_filename` and
    /// rename it over the cache file.
    pub fn save(&mut self, tmp_filename: &Path) -> Result<()> {
        let now = now_seconds();
        let cutoff = now.saturating_sub(RETAIN_SECONDS);

        let dynamic = self.dynamic.get_mut().unwrap();
        let mut dyn_records: Vec<(&HashDigest, &ScanRecord)> = dynamic.iter().collect();
        dyn_records.sort_by(|a, b| a.0.cmp(b.0));

        let mut writer = ScanCacheWriter::new();
        let mut string_pool: HashTable<BinaryLocator> = HashTable::for_paths();

        let frozen_view = self.frozen.as_ref().map(|m| ScanView::new(m.bytes()));
        let frozen_count = frozen_view.map(|v| v.entry_count()).unwrap_or(0);

        traverse_sorted_arrays(
            dyn_records.len(),
            |index| *dyn_records[index].0,
            frozen_count,
            |index| frozen_view.unwrap().key(index),
            |elem| match elem {
                MergeElem::First(index) => {
                    let (key, record) = dyn_records[index];
                    writer.save_record(
                        &mut string_pool,
                        key,
                        record.includes.iter().map(|f| (f.path.as_str(), f.hash)),
                        record.includes.len(),
                        record.file_timestamp,
                        now,
                    );
                }
                MergeElem::Second(index) => {
                    let view = frozen_view.unwrap();
                    let access_time = if self.frozen_access[index].load(Ordering::Relaxed) {
                        now
                    } else {
                        view.access_time(index)
                    };
                    if access_time > cutoff {
                        let key = view.key(index);
                        let count = view.included_files(index).count();
                        writer.save_record(
                            &mut string_pool,
                            &key,
                            view.included_files(index),
                            count,
                            view.file_timestamp(index),
                            access_time,
                        );
                    }
                }
            },
        );

        // The mapping is about to be replaced on disk; drop it first so the
        // rename works on platforms that refuse to replace mapped files.
        self.frozen = None;
        self.frozen_access.clear();

        writer
            .flush(tmp_filename, &self.state_filename)
            .with_context(|| format!("saving scan cache to {}", self.state_filename.display()))
    }
}

/// Segment bookkeeping for the scan cache format.
struct ScanCacheWriter {
    writer: BinaryWriter,
    main_seg: SegmentId,
    digest_seg: SegmentId,
    data_seg: SegmentId,
    timestamp_seg: SegmentId,
    array_seg: SegmentId,
    string_seg: SegmentId,
    digest_pos: BinaryLocator,
    entry_pos: BinaryLocator,
    timestamp_pos: BinaryLocator,
    records_out: i32,
}

impl ScanCacheWriter {
    fn new() -> ScanCacheWriter {
        let mut writer = BinaryWriter::new();
        let main_seg = writer.add_segment();
        let digest_seg = writer.add_segment();
        let data_seg = writer.add_segment();
        let timestamp_seg = writer.add_segment();
        let array_seg = writer.add_segment();
        let string_seg = writer.add_segment();

        let digest_pos = writer.position(digest_seg);
        let entry_pos = writer.position(data_seg);
        let timestamp_pos = writer.position(timestamp_seg);

        ScanCacheWriter {
            writer,
            main_seg,
            digest_seg,
            data_seg,
            timestamp_seg,
            array_seg,
            string_seg,
            digest_pos,
            entry_pos,
            timestamp_pos,
            records_out: 0,
        }
    }

    fn save_record<'a>(
        &mut self,
        string_pool: &mut HashTable<BinaryLocator>,
        key: &HashDigest,
        includes: impl Iterator<Item = (&'a str, u32)>,
        include_count: usize,
        file_timestamp: u64,
        access_time: u64,
    ) {
        let string_ptrs = self.writer.position(self.array_seg);

        for (path, hash) in includes {
            // Deduplicate string storage across records.
            match string_pool.lookup(hash, path).copied() {
                Some(pos) => self.writer.write_pointer(self.array_seg, pos),
                None => {
                    let pos = self.writer.position(self.string_seg);
                    string_pool.insert(hash, path, pos);
                    self.writer.write_pointer(self.array_seg, pos);
                    self.writer.write_string_data(self.string_seg, path);
                }
            }
            self.writer.write_u32(self.array_seg, hash);
        }

        self.writer.write_bytes(self.digest_seg, &key.0);

        self.writer.write_u64(self.data_seg, file_timestamp);
        self.writer
            .write_array_header(self.data_seg, include_count as i32, string_ptrs);

        self.writer.write_u64(self.timestamp_seg, access_time);

        self.records_out += 1;
    }

    fn flush(mut self, tmp: &Path, target: &Path) -> Result<()> {
        self.writer.write_u32(self.main_seg, SCAN_MAGIC);
        self.writer.write_i32(self.main_seg, self.records_out);
        if self.records_out == 0 {
            self.writer.write_null_pointer(self.main_seg);
            self.writer.write_null_pointer(self.main_seg);
            self.writer.write_null_pointer(self.main_seg);
        } else {
            self.writer.write_pointer(self.main_seg, self.digest_pos);
            self.writer.write_pointer(self.main_seg, self.entry_pos);
            self.writer.write_pointer(self.main_seg, self.timestamp_pos);
        }

        commit_cache_file(self.writer, tmp, target)
    }
}
