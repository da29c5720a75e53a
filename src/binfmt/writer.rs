//! Multi-segment binary emitter with late pointer fixup.
//!
//! Data is appended to independent segments; pointers to positions in any
//! segment are recorded as fixups and rewritten at flush time, once every
//! segment's final file offset is known.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("pointer relocation too big ({0})")]
    RelocationTooLarge(i64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Names a position in a segment before final offsets are known.
#[derive(Clone, Copy, Debug)]
pub struct BinaryLocator {
    seg_index: usize,
    offset: usize,
}

/// Handle to a segment owned by a [`BinaryWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentId(usize);

struct Fixup {
    pointer_offset: usize,
    target: BinaryLocator,
}

struct Segment {
    bytes: Vec<u8>,
    fixups: Vec<Fixup>,
}

pub struct BinaryWriter {
    segments: Vec<Segment>,
}

const SEGMENT_ALIGNMENT: usize = 16;
const PAD_BYTE: u8 = 0xfe;
const PLACEHOLDER_POINTER: u32 = 0x7eee_eeee;

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryWriter {
    pub fn new() -> BinaryWriter {
        BinaryWriter { segments: Vec::new() }
    }

    pub fn add_segment(&mut self) -> SegmentId {
        self.segments.push(Segment {
            bytes: Vec::with_capacity(128 * 1024),
            fixups: Vec::new(),
        });
        SegmentId(self.segments.len() - 1)
    }

    /// Current position in `seg`, for use as a later pointer target.
    pub fn position(&self, seg: SegmentId) -> BinaryLocator {
        BinaryLocator {
            seg_index: seg.0,
            offset: self.segments[seg.0].bytes.len(),
        }
    }

    pub fn write_bytes(&mut self, seg: SegmentId, data: &[u8]) {
        self.segments[seg.0].bytes.extend_from_slice(data);
    }

    pub fn write_u8(&mut self, seg: SegmentId, v: u8) {
        self.write_bytes(seg, &[v]);
    }

    pub fn write_i16(&mut self, seg: SegmentId, v: i16) {
        self.write_bytes(seg, &v.to_le_bytes());
    }

    pub fn write_i32(&mut self, seg: SegmentId, v: i32) {
        self.write_bytes(seg, &v.to_le_bytes());
    }

    pub fn write_u32(&mut self, seg: SegmentId, v: u32) {
        self.write_bytes(seg, &v.to_le_bytes());
    }

    pub fn write_u64(&mut self, seg: SegmentId, v: u64) {
        self.write_bytes(seg, &v.to_le_bytes());
    }

    /// Append nul-terminated string data.
    pub fn write_string_data(&mut self, seg: SegmentId, s: &str) {
        self.write_bytes(seg, s.as_bytes());
        self.write_u8(seg, 0);
    }

    /// Emit a pointer word to be fixed up at flush time.
    pub fn write_pointer(&mut self, seg: SegmentId, target: BinaryLocator) {
        let segment = &mut self.segments[seg.0];
        segment.fixups.push(Fixup {
            pointer_offset: segment.bytes.len(),
            target,
        });
        segment.bytes.extend_from_slice(&PLACEHOLDER_POINTER.to_le_bytes());
    }

    pub fn write_null_pointer(&mut self, seg: SegmentId) {
        self.write_u32(seg, 0);
    }

    /// Convenience: emit `{ i32 count, ptr32 }`.
    pub fn write_array_header(&mut self, seg: SegmentId, count: i32, target: BinaryLocator) {
        self.write_i32(seg, count);
        if count == 0 {
            // A zero count never dereferences the pointer; keep it null so
            // empty arrays are byte-for-byte identical.
            self.write_null_pointer(seg);
        } else {
            self.write_pointer(seg, target);
        }
    }

    /// Pad segments to 16 bytes, compute final offsets, apply fixups and
    /// return the assembled file image.
    pub fn finalize(mut self) -> Result<Vec<u8>, WriterError> {
        for segment in &mut self.segments {
            let len = segment.bytes.len();
            let aligned = (len + SEGMENT_ALIGNMENT - 1) & !(SEGMENT_ALIGNMENT - 1);
            segment.bytes.resize(aligned, PAD_BYTE);
        }

        let mut global_offsets = Vec::with_capacity(self.segments.len());
        let mut offset = 0usize;
        for segment in &self.segments {
            global_offsets.push(offset);
            offset += segment.bytes.len();
        }

        for i in 0..self.segments.len() {
            let seg_base = global_offsets[i] as i64;
            // Move the fixup list out so the byte patching below can borrow
            // the segment storage mutably.
            let fixups = std::mem::take(&mut self.segments[i].fixups);
            for fixup in &fixups {
                let source = seg_base + fixup.pointer_offset as i64;
                let dest = global_offsets[fixup.target.seg_index] as i64 + fixup.target.offset as i64;
                let delta = dest - source;
                let delta32 = delta as i32;
                if i64::from(delta32) != delta {
                    return Err(WriterError::RelocationTooLarge(delta));
                }
                let at = fixup.pointer_offset;
                self.segments[i].bytes[at..at + 4].copy_from_slice(&delta32.to_le_bytes());
            }
        }

        let mut out = Vec::with_capacity(offset);
        for segment in &self.segments {
            out.extend_from_slice(&segment.bytes);
        }
        Ok(out)
    }

    /// Finalize and write the image to `path`.
    pub fn flush(self, path: &Path) -> Result<(), WriterError> {
        let image = self.finalize()?;
        let mut file = fs::File::create(path)?;
        file.write_all(&image)?;
        Ok(())
    }
}
