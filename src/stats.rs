//! Build statistics counters, updated from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

/// Counters for one run. Owned by the driver and passed by reference; all
/// fields are atomics so worker threads update them without locks.
#[derive(Default)]
pub struct Stats {
    pub stat_cache_hits: AtomicU64,
    pub stat_cache_misses: AtomicU64,
    pub stat_cache_dirty: AtomicU64,
    pub digest_cache_hits: AtomicU64,
    pub file_digest_count: AtomicU64,
    pub old_scan_cache_hits: AtomicU64,
    pub new_scan_cache_hits: AtomicU64,
    pub scan_cache_misses: AtomicU64,
    pub scan_cache_inserts: AtomicU64,
    pub exec_count: AtomicU64,
    pub state_save_new: AtomicU64,
    pub state_save_old: AtomicU64,
    pub state_save_dropped: AtomicU64,
}

impl Stats {
    pub fn new() -> Stats {
        Stats::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dump(&self) {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        debug!(
            "stat cache: {} hits, {} misses, {} dirty re-stats",
            get(&self.stat_cache_hits),
            get(&self.stat_cache_misses),
            get(&self.stat_cache_dirty)
        );
        debug!(
            "digest cache: {} hits, {} files digested",
            get(&self.digest_cache_hits),
            get(&self.file_digest_count)
        );
        debug!(
            "scan cache: {} frozen hits, {} new hits, {} misses, {} inserts",
            get(&self.old_scan_cache_hits),
            get(&self.new_scan_cache_hits),
            get(&self.scan_cache_misses),
            get(&self.scan_cache_inserts)
        );
        debug!("processes executed: {}", get(&self.exec_count));
        debug!(
            "state save: {} new records, {} carried over, {} dropped",
            get(&self.state_save_new),
            get(&self.state_save_old),
            get(&self.state_save_dropped)
        );
    }
}
