//! Frozen binary files: the segmented writer and the memory-mapped readers.
//!
//! All four on-disk formats (DAG, previous build state, scan cache, digest
//! cache) share one encoding: little-endian integers, 16-byte aligned
//! segments, pointers stored as a signed 32-bit delta from the pointer's own
//! location (zero meaning null), and arrays as `{ i32 count, ptr32 }`.

pub mod dag;
pub mod digest;
pub mod frozen;
pub mod scan;
pub mod state;
pub mod writer;

use std::path::Path;

use anyhow::Result;
use log::debug;
use memmap2::Mmap;

use writer::BinaryWriter;

/// Constant folded into every format magic.
pub const HASH_MAGIC: u32 = 0x7810_221e;

pub const DAG_MAGIC: u32 = 0x1589_010d ^ HASH_MAGIC;
pub const STATE_MAGIC: u32 = 0x1589_0102 ^ HASH_MAGIC;
pub const SCAN_MAGIC: u32 = 0x1517_000e ^ HASH_MAGIC;
pub const DIGEST_MAGIC: u32 = 0x1278_1fa6 ^ HASH_MAGIC;

/// A frozen file held in memory via a read-only mapping.
pub struct MappedFile {
    mmap: Mmap,
}

impl MappedFile {
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

/// Map `path` and verify its magic word. Any failure (missing file, short
/// file, wrong magic) is treated as "file absent" and reported as `None`.
pub fn map_frozen_file(path: &Path, magic: u32) -> Option<MappedFile> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => {
            debug!("{}: mmap failed", path.display());
            return None;
        }
    };

    let mmap = match unsafe { Mmap::map(&file) } {
        Ok(m) => m,
        Err(_) => {
            debug!("{}: mmap failed", path.display());
            return None;
        }
    };

    if mmap.len() < 4 {
        debug!("{}: bad mmap size {}", path.display(), mmap.len());
        return None;
    }

    let file_magic = u32::from_le_bytes(mmap[0..4].try_into().unwrap());
    if file_magic != magic {
        debug!(
            "{}: bad magic number {:08x} - current is {:08x}",
            path.display(),
            file_magic,
            magic
        );
        return None;
    }

    debug!("{}: successfully mapped ({} bytes)", path.display(), mmap.len());
    Some(MappedFile { mmap })
}

/// Flush `writer` to the temp file and rename over the target. The rename is
/// the commit point; on any failure the temp file is removed.
pub fn commit_cache_file(writer: BinaryWriter, tmp: &Path, target: &Path) -> Result<()> {
    let result = writer
        .flush(tmp)
        .map_err(anyhow::Error::new)
        .and_then(|_| std::fs::rename(tmp, target).map_err(anyhow::Error::new));
    if result.is_err() {
        let _ = std::fs::remove_file(tmp);
    }
    result
}
