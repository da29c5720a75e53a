//! Normalized path representation.
//!
//! A [`PathBuffer`] decomposes a path into an absolute flag, a windows device
//! flag, a count of leading `..` segments that survived normalization and an
//! ordered list of real segments. Construction collapses `.`, `..` and
//! redundant separators, so two paths naming the same file compare equal.

use thiserror::Error;

pub const MAX_PATH_LENGTH: usize = 512;
pub const MAX_PATH_SEGMENTS: usize = 64;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path too long: {0}")]
    PathTooLong(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PathType {
    Unix,
    Windows,
}

impl PathType {
    pub fn native() -> PathType {
        if cfg!(windows) {
            PathType::Windows
        } else {
            PathType::Unix
        }
    }

    fn separator(self) -> char {
        match self {
            PathType::Unix => '/',
            PathType::Windows => '\\',
        }
    }
}

#[derive(Clone, Debug)]
pub struct PathBuffer {
    path_type: PathType,
    absolute: bool,
    windows_device: bool,
    leading_dotdots: u16,
    /// End offset of each segment in `data`.
    seg_ends: Vec<u16>,
    data: Vec<u8>,
}

impl PartialEq for PathBuffer {
    fn eq(&self, other: &PathBuffer) -> bool {
        self.seg_ends == other.seg_ends && self.data == other.data
    }
}

impl Eq for PathBuffer {}

impl PathBuffer {
    /// Parse and normalize `path`. Splits on both separator styles, cancels
    /// each `..` against the nearest preceding real segment and counts the
    /// leftovers into `leading_dotdots`.
    pub fn init(path: &str, path_type: PathType) -> Result<PathBuffer, PathError> {
        let mut rest = path;
        let mut absolute = false;
        let mut windows_device = false;

        match path_type {
            PathType::Unix => {
                if rest.starts_with('/') {
                    absolute = true;
                    rest = &rest[1..];
                }
            }
            PathType::Windows => {
                let bytes = rest.as_bytes();
                if rest.starts_with('\\') || rest.starts_with('/') {
                    absolute = true;
                    rest = &rest[1..];
                } else if bytes.len() >= 3
                    && bytes[0].is_ascii_alphabetic()
                    && bytes[1] == b':'
                    && (bytes[2] == b'\\' || bytes[2] == b'/')
                {
                    // X:\ style path keeps the drive as segment 0.
                    absolute = true;
                    windows_device = true;
                }
            }
        }

        struct Seg<'a> {
            text: &'a str,
            dotdot: bool,
            drop: bool,
        }

        let mut segs: Vec<Seg> = Vec::new();
        for part in rest.split(['/', '\\']) {
            if part.is_empty() {
                continue;
            }
            if segs.len() == MAX_PATH_SEGMENTS {
                return Err(PathError::PathTooLong(path.to_string()));
            }
            segs.push(Seg {
                text: part,
                dotdot: part == "..",
                drop: part == ".",
            });
        }

        // Right-to-left pass: each `..` cancels the nearest preceding real
        // segment; survivors become leading dotdots.
        let mut dotdot_drops: u16 = 0;
        for seg in segs.iter_mut().rev() {
            if seg.drop {
                continue;
            }
            if seg.dotdot {
                dotdot_drops += 1;
                seg.drop = true;
            } else if dotdot_drops > 0 {
                dotdot_drops -= 1;
                seg.drop = true;
            }
        }

        let mut buffer = PathBuffer {
            path_type,
            absolute,
            windows_device,
            leading_dotdots: dotdot_drops,
            seg_ends: Vec::new(),
            data: Vec::new(),
        };

        for seg in segs.iter().filter(|s| !s.drop) {
            if buffer.data.len() + seg.text.len() > MAX_PATH_LENGTH {
                return Err(PathError::PathTooLong(path.to_string()));
            }
            buffer.data.extend_from_slice(seg.text.as_bytes());
            buffer.seg_ends.push(buffer.data.len() as u16);
        }

        Ok(buffer)
    }

    /// Parse with the native separator convention.
    pub fn native(path: &str) -> Result<PathBuffer, PathError> {
        PathBuffer::init(path, PathType::native())
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn seg_count(&self) -> usize {
        self.seg_ends.len()
    }

    pub fn leading_dotdots(&self) -> u16 {
        self.leading_dotdots
    }

    fn seg(&self, i: usize) -> &str {
        let start = if i > 0 { self.seg_ends[i - 1] as usize } else { 0 };
        let end = self.seg_ends[i] as usize;
        std::str::from_utf8(&self.data[start..end]).unwrap_or("")
    }

    /// Drop the last segment. A windows device path keeps its drive segment.
    /// Returns false when nothing could be removed.
    pub fn strip_last(&mut self) -> bool {
        let min_segs = if self.windows_device { 1 } else { 0 };
        if self.seg_ends.len() > min_segs {
            let end = self.seg_ends.pop().unwrap();
            let start = self.seg_ends.last().copied().unwrap_or(0);
            self.data.truncate(self.data.len() - (end - start) as usize);
            true
        } else {
            false
        }
    }

    /// Append `other`. An absolute `other` replaces `self` wholesale;
    /// otherwise `other`'s leading `..`s pop real segments first, clamping at
    /// the root (or the windows drive).
    pub fn concat(&mut self, other: &PathBuffer) -> Result<(), PathError> {
        if other.is_absolute() {
            *self = other.clone();
            return Ok(());
        }

        let min_segs = if self.windows_device { 1 } else { 0 };
        for _ in 0..other.leading_dotdots {
            if self.seg_ends.len() > min_segs {
                self.strip_last();
            } else if self.seg_ends.is_empty() {
                self.leading_dotdots += 1;
            }
        }

        // Can't go higher than the root directory.
        if self.absolute {
            self.leading_dotdots = 0;
        }

        if self.seg_ends.len() + other.seg_ends.len() > MAX_PATH_SEGMENTS
            || self.data.len() + other.data.len() > MAX_PATH_LENGTH
        {
            return Err(PathError::PathTooLong(format!(
                "{}+{}",
                self.format(),
                other.format()
            )));
        }

        let base = self.data.len() as u16;
        self.data.extend_from_slice(&other.data);
        self.seg_ends.extend(other.seg_ends.iter().map(|e| e + base));
        Ok(())
    }

    pub fn concat_str(&mut self, other: &str) -> Result<(), PathError> {
        let buf = PathBuffer::init(other, self.path_type)?;
        self.concat(&buf)
    }

    /// Format with the target platform separator, re-emitting leading `..`s.
    pub fn format(&self) -> String {
        let sep = self.path_type.separator();
        let mut out = String::with_capacity(self.data.len() + self.seg_count() + 4);

        if self.absolute && !self.windows_device {
            out.push(sep);
        }

        for _ in 0..self.leading_dotdots {
            out.push_str("..");
            out.push(sep);
        }

        for i in 0..self.seg_count() {
            if i > 0 {
                out.push(sep);
            }
            out.push_str(self.seg(i));
        }
        out
    }
}

/// Normalize a path string in one go.
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    Ok(PathBuffer::native(path)?.format())
}

/// Parent directory of `path` as a normalized string, or None at the root.
pub fn parent_dir(path: &str) -> Option<String> {
    let mut buf = PathBuffer::native(path).ok()?;
    if buf.strip_last() && buf.seg_count() > 0 {
        Some(buf.format())
    } else {
        None
    }
}
