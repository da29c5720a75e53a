//! Implicit dependency scanning.
//!
//! Line-oriented `#include` extraction with two variants sharing the outer
//! loop: the C/C++ scanner and a generic scanner parameterized by a keyword
//! table. Extracted include names are resolved against the including file's
//! directory and the scanner's include paths, then the resolved files are
//! scanned in turn until the include closure is complete. Per-file results
//! are memoized in the scan cache keyed by the file's mtime.

use std::io::Read;

use crate::binfmt::dag::{Keyword, ScannerKind, ScannerView, scanner_flags};
use crate::hashtable::HashSet;
use crate::mem::{LinearAllocator, LinearScope};
use crate::paths::PathBuffer;
use crate::scan_cache::{ScanCache, compute_scan_cache_key};
use crate::stat_cache::StatCache;
use crate::stats::Stats;
use crate::types::FileAndHash;

/// One include directive pulled out of a source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawInclude {
    pub path: String,
    pub is_system: bool,
    pub should_follow: bool,
}

fn skip_whitespace(line: &[u8], mut pos: usize) -> usize {
    while pos < line.len() && line[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Scan one line for `#` WS* `include` WS+ (`"file"` | `<file>`).
pub fn scan_cpp_line(line: &[u8]) -> Option<RawInclude> {
    let mut pos = skip_whitespace(line, 0);

    if line.get(pos) != Some(&b'#') {
        return None;
    }
    pos = skip_whitespace(line, pos + 1);

    if !line[pos..].starts_with(b"include") {
        return None;
    }
    pos += 7;

    // At least one whitespace char must separate the keyword and the name.
    if !line.get(pos)?.is_ascii_whitespace() {
        return None;
    }
    pos = skip_whitespace(line, pos + 1);

    let closing = match line.get(pos)? {
        b'<' => b'>',
        b'"' => b'"',
        _ => return None,
    };
    pos += 1;

    let end = pos + line[pos..].iter().position(|&c| c == closing)?;
    let path = std::str::from_utf8(&line[pos..end]).ok()?;

    Some(RawInclude {
        path: path.to_string(),
        is_system: closing == b'>',
        should_follow: true,
    })
}

/// Scan one line with a generic keyword table.
pub fn scan_generic_line(line: &[u8], keywords: &[Keyword], flags: u32) -> Option<RawInclude> {
    let require_ws = flags & scanner_flags::REQUIRE_WHITESPACE != 0;
    let use_separators = flags & scanner_flags::USE_SEPARATORS != 0;
    let bare_is_system = flags & scanner_flags::BARE_MEANS_SYSTEM != 0;

    let mut pos = skip_whitespace(line, 0);
    if require_ws && pos == 0 {
        return None;
    }

    let keyword = keywords
        .iter()
        .find(|kw| line[pos..].starts_with(kw.text.as_bytes()))?;
    pos += keyword.text.len();

    if !line.get(pos)?.is_ascii_whitespace() {
        return None;
    }
    pos = skip_whitespace(line, pos + 1);

    let (path, is_system) = if use_separators {
        let closing = match line.get(pos)? {
            b'<' => b'>',
            // A really crude way to match <file>path</file> in QRC files.
            b'>' => b'<',
            b'"' => b'"',
            _ => return None,
        };
        pos += 1;
        let end = pos + line[pos..].iter().position(|&c| c == closing)?;
        (&line[pos..end], closing == b'>')
    } else {
        let end = pos
            + line[pos..]
                .iter()
                .position(|c| c.is_ascii_whitespace())
                .unwrap_or(line.len() - pos);
        if end == pos {
            return None;
        }
        (&line[pos..end], bare_is_system)
    };

    let path = std::str::from_utf8(path).ok()?;
    Some(RawInclude {
        path: path.to_string(),
        is_system,
        should_follow: keyword.should_follow,
    })
}

/// Extract all include directives from a buffer of source text.
pub fn scan_includes_cpp(data: &[u8]) -> Vec<RawInclude> {
    data.split(|&c| c == b'\n').filter_map(scan_cpp_line).collect()
}

pub fn scan_includes_generic(data: &[u8], keywords: &[Keyword], flags: u32) -> Vec<RawInclude> {
    data.split(|&c| c == b'\n')
        .filter_map(|line| scan_generic_line(line, keywords, flags))
        .collect()
}

/// Resolve an include name to a path that exists on disk. A quoted include
/// is first tried relative to the including file's directory; that failing,
/// and always for system includes, the scanner's include paths are tried in
/// order.
fn find_file(
    stat_cache: &StatCache,
    stats: &Stats,
    including_file: &str,
    scanner: ScannerView<'_>,
    include: &RawInclude,
) -> Option<String> {
    let include_buf = PathBuffer::native(&include.path).ok()?;

    if !include.is_system
        && let Ok(mut buffer) = PathBuffer::native(including_file)
    {
        buffer.strip_last();
        if buffer.concat(&include_buf).is_ok() {
            let candidate = buffer.format();
            if stat_cache.stat_path(&candidate, stats).exists {
                return Some(candidate);
            }
        }
    }

    for include_path in scanner.include_paths() {
        let Ok(mut buffer) = PathBuffer::native(include_path) else {
            continue;
        };
        if buffer.concat(&include_buf).is_err() {
            continue;
        }
        let candidate = buffer.format();
        if stat_cache.stat_path(&candidate, stats).exists {
            return Some(candidate);
        }
    }

    None
}

const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

/// Read `filename` into scratch memory and extract its resolved includes, in
/// the order they were found.
fn scan_file(
    stat_cache: &StatCache,
    stats: &Stats,
    filename: &str,
    file_size: usize,
    scanner: ScannerView<'_>,
    scratch: &mut LinearAllocator,
) -> Option<Vec<FileAndHash>> {
    let mut scope = LinearScope::new(scratch);
    // One extra newline sorts out a trailing include on the last line.
    let buffer = scope.alloc(file_size + 1, 1).ok()?;

    let mut file = std::fs::File::open(filename).ok()?;
    file.read_exact(&mut buffer[..file_size]).ok()?;
    buffer[file_size] = b'\n';

    // Skip a UTF-8 marker if present.
    let data: &[u8] = if buffer.starts_with(&UTF8_BOM) {
        &buffer[UTF8_BOM.len()..]
    } else {
        buffer
    };

    let raw = match scanner.kind() {
        ScannerKind::Cpp => scan_includes_cpp(data),
        ScannerKind::Generic => {
            scan_includes_generic(data, &scanner.keywords(), scanner.generic_flags())
        }
    };

    let mut found = Vec::with_capacity(raw.len());
    for include in &raw {
        if let Some(path) = find_file(stat_cache, stats, filename, scanner, include) {
            found.push(FileAndHash::new(path));
        }
    }
    Some(found)
}

/// Walk the include closure of `filename`, consulting and feeding the scan
/// cache. Returns every distinct resolved include, in discovery order.
pub fn scan_implicit_deps(
    stat_cache: &StatCache,
    scan_cache: &ScanCache,
    scanner: ScannerView<'_>,
    filename: &str,
    scratch: &mut LinearAllocator,
    stats: &Stats,
) -> Vec<FileAndHash> {
    let scanner_guid = scanner.guid();

    let mut result: Vec<FileAndHash> = Vec::new();
    let mut seen = HashSet::for_paths();
    let mut stack: Vec<String> = vec![filename.to_string()];

    while let Some(current) = stack.pop() {
        let info = stat_cache.stat_path(&current, stats);
        if !info.exists {
            continue;
        }

        let key = compute_scan_cache_key(&current, scanner_guid);

        let includes = match scan_cache.lookup(&key, info.timestamp, stats) {
            Some(includes) => includes,
            None => {
                let found = scan_file(
                    stat_cache,
                    stats,
                    &current,
                    info.size as usize,
                    scanner,
                    scratch,
                )
                .unwrap_or_default();
                scan_cache.insert(key, info.timestamp, found.clone(), stats);
                found
            }
        };

        for file in includes {
            if seen.insert(file.hash, &file.path) {
                stack.push(file.path.clone());
                result.push(file);
            }
        }
    }

    result
}
