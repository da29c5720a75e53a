//! Typed view of the frozen content-digest cache (`.tundra2.digestcache`).
//!
//! Layout: `u32 magic, record array` of 48-byte records:
//! `u64 mtime, u64 access time, u32 path hash, digest16, ptr32 path,
//! 8 bytes padding`.

use crate::hash::HashDigest;

use super::frozen::FrozenView;

pub const DIGEST_RECORD_SIZE: usize = 48;

#[derive(Clone, Copy)]
pub struct DigestCacheView<'a> {
    v: FrozenView<'a>,
}

#[derive(Clone, Copy)]
pub struct DigestRecord<'a> {
    pub timestamp: u64,
    pub access_time: u64,
    pub filename_hash: u32,
    pub content_digest: HashDigest,
    pub filename: &'a str,
}

impl<'a> DigestCacheView<'a> {
    pub fn new(bytes: &'a [u8]) -> DigestCacheView<'a> {
        DigestCacheView {
            v: FrozenView::new(bytes),
        }
    }

    pub fn record_count(&self) -> usize {
        self.v.array_at(4).count
    }

    pub fn record(&self, index: usize) -> DigestRecord<'a> {
        let arr = self.v.array_at(4);
        let off = arr.elem_offset(index, DIGEST_RECORD_SIZE);
        DigestRecord {
            timestamp: self.v.u64_at(off),
            access_time: self.v.u64_at(off + 8),
            filename_hash: self.v.u32_at(off + 16),
            content_digest: self.v.digest_at(off + 20),
            filename: self.v.str_ptr_at(off + 36).unwrap_or(""),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = DigestRecord<'a>> + '_ {
        (0..self.record_count()).map(|i| self.record(i))
    }
}
