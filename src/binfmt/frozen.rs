//! Read-only access to frozen file images.
//!
//! A [`FrozenView`] wraps the raw mapped bytes. Pointers are signed 32-bit
//! deltas stored at the pointer's own offset; dereferencing adds the delta to
//! that offset, with zero reading as null. The typed format views in the
//! sibling modules are thin offset calculators over this.

use crate::hash::HashDigest;

#[derive(Clone, Copy)]
pub struct FrozenView<'a> {
    bytes: &'a [u8],
}

impl<'a> FrozenView<'a> {
    pub fn new(bytes: &'a [u8]) -> FrozenView<'a> {
        FrozenView { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn u32_at(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    pub fn i32_at(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    pub fn i16_at(&self, offset: usize) -> i16 {
        i16::from_le_bytes(self.bytes[offset..offset + 2].try_into().unwrap())
    }

    pub fn u8_at(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    pub fn u64_at(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.bytes[offset..offset + 8].try_into().unwrap())
    }

    pub fn digest_at(&self, offset: usize) -> HashDigest {
        HashDigest(self.bytes[offset..offset + 16].try_into().unwrap())
    }

    /// Resolve the pointer word at `offset`; `None` when the stored delta is
    /// zero.
    pub fn ptr_at(&self, offset: usize) -> Option<usize> {
        let delta = self.i32_at(offset);
        if delta == 0 {
            None
        } else {
            Some((offset as i64 + i64::from(delta)) as usize)
        }
    }

    /// Nul-terminated string starting at `offset`.
    pub fn str_at(&self, offset: usize) -> &'a str {
        let tail = &self.bytes[offset..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..end]).unwrap_or("")
    }

    /// Dereference a string pointer stored at `offset`.
    pub fn str_ptr_at(&self, offset: usize) -> Option<&'a str> {
        self.ptr_at(offset).map(|target| self.str_at(target))
    }

    /// Decode the `{ i32 count, ptr32 }` array header at `offset` into
    /// (count, base offset of element 0).
    pub fn array_at(&self, offset: usize) -> FrozenArray<'a> {
        let count = self.i32_at(offset).max(0) as usize;
        let base = if count == 0 {
            0
        } else {
            self.ptr_at(offset + 4).unwrap_or(0)
        };
        FrozenArray {
            view: *self,
            count,
            base,
        }
    }
}

/// Decoded array header: `count` elements starting at byte offset `base`.
/// Element layout is up to the caller.
#[derive(Clone, Copy)]
pub struct FrozenArray<'a> {
    pub view: FrozenView<'a>,
    pub count: usize,
    pub base: usize,
}

impl<'a> FrozenArray<'a> {
    pub fn elem_offset(&self, index: usize, elem_size: usize) -> usize {
        debug_assert!(index < self.count);
        self.base + index * elem_size
    }

    /// Iterate an array of i32 elements.
    pub fn iter_i32(self) -> impl Iterator<Item = i32> + 'a {
        let view = self.view;
        let base = self.base;
        (0..self.count).map(move |i| view.i32_at(base + 4 * i))
    }

    /// Iterate an array of u32 elements.
    pub fn iter_u32(self) -> impl Iterator<Item = u32> + 'a {
        let view = self.view;
        let base = self.base;
        (0..self.count).map(move |i| view.u32_at(base + 4 * i))
    }

    /// Iterate an array of string pointers.
    pub fn iter_str(self) -> impl Iterator<Item = &'a str> + 'a {
        let view = self.view;
        let base = self.base;
        (0..self.count).map(move |i| view.str_ptr_at(base + 4 * i).unwrap_or(""))
    }

    /// Iterate an array of `{ ptr32 filename, u32 hash }` pairs.
    pub fn iter_file_and_hash(self) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        let view = self.view;
        let base = self.base;
        (0..self.count).map(move |i| {
            let off = base + 8 * i;
            (view.str_ptr_at(off).unwrap_or(""), view.u32_at(off + 4))
        })
    }
}

/// Binary search in a frozen array of sorted 16-byte digests. Returns the
/// element index on a hit.
pub fn binary_search_digests(view: FrozenView<'_>, base: usize, count: usize, key: &HashDigest) -> Option<usize> {
    let mut lo = 0usize;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let probe = view.digest_at(base + 16 * mid);
        match probe.cmp(key) {
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
            std::cmp::Ordering::Equal => return Some(mid),
        }
    }
    None
}
