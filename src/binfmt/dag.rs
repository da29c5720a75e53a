//! Typed view of the frozen DAG file (`.tundra2.dag`).
//!
//! Header layout (byte offsets):
//!
//! ```text
//!   0 magic                     u32
//!   4 node count                i32
//!   8 node guids                ptr32 -> [digest16]
//!  12 node data                 ptr32 -> [NodeData]
//!  16 passes                    array of ptr32 name
//!  24 config count/names/hashes i32, ptr32, ptr32
//!  36 variant ...               i32, ptr32, ptr32
//!  48 subvariant ...            i32, ptr32, ptr32
//!  60 build tuples              array
//!  68 default config/variant/subvariant indices   3 x i32
//!  80 file signatures           array
//!  88 glob signatures           array
//!  96 digest-sign ext hashes    array of u32
//! 104 max expensive count       i32
//! ```

use crate::hash::HashDigest;

use super::frozen::FrozenView;

pub const NODE_DATA_SIZE: usize = 80;
pub const FILE_AND_HASH_SIZE: usize = 8;
pub const PASS_DATA_SIZE: usize = 4;
pub const BUILD_TUPLE_SIZE: usize = 36;
pub const NAMED_NODE_SIZE: usize = 8;
pub const FILE_SIGNATURE_SIZE: usize = 16;
pub const GLOB_SIGNATURE_SIZE: usize = 20;
pub const KEYWORD_DATA_SIZE: usize = 8;
pub const ENV_VAR_SIZE: usize = 8;

/// Maximum number of passes the driver will accept at load time.
pub const MAX_PASSES: usize = 64;

pub mod node_flags {
    /// Safe to overwrite output files in place; without it outputs are
    /// removed before the action runs.
    pub const OVERWRITE_OUTPUTS: u32 = 1 << 0;
    /// Keep output files even if the build fails.
    pub const PRECIOUS_OUTPUTS: u32 = 1 << 1;
    /// Throttled by the max-expensive cap.
    pub const EXPENSIVE: u32 = 1 << 2;
    /// The action string is a payload to write to outputs[0].
    pub const WRITE_TEXT_FILE: u32 = 1 << 3;
    /// Unexpected process output does not fail the node.
    pub const ALLOW_UNEXPECTED_OUTPUT: u32 = 1 << 4;
}

pub mod scanner_flags {
    pub const REQUIRE_WHITESPACE: u32 = 1 << 0;
    pub const USE_SEPARATORS: u32 = 1 << 1;
    pub const BARE_MEANS_SYSTEM: u32 = 1 << 2;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScannerKind {
    Cpp,
    Generic,
}

#[derive(Clone, Copy)]
pub struct DagView<'a> {
    v: FrozenView<'a>,
}

impl<'a> DagView<'a> {
    pub fn new(bytes: &'a [u8]) -> DagView<'a> {
        DagView {
            v: FrozenView::new(bytes),
        }
    }

    pub fn node_count(&self) -> usize {
        self.v.i32_at(4).max(0) as usize
    }

    fn guid_base(&self) -> usize {
        self.v.ptr_at(8).unwrap_or(0)
    }

    pub fn node_guid(&self, index: usize) -> HashDigest {
        self.v.digest_at(self.guid_base() + 16 * index)
    }

    /// Binary search the sorted guid array; returns the node index.
    pub fn find_node_by_guid(&self, guid: &HashDigest) -> Option<usize> {
        super::frozen::binary_search_digests(self.v, self.guid_base(), self.node_count(), guid)
    }

    pub fn node(&self, index: usize) -> NodeView<'a> {
        debug_assert!(index < self.node_count());
        let base = self.v.ptr_at(12).unwrap_or(0);
        NodeView {
            v: self.v,
            off: base + NODE_DATA_SIZE * index,
        }
    }

    pub fn pass_count(&self) -> usize {
        self.v.array_at(16).count
    }

    pub fn pass_name(&self, index: usize) -> &'a str {
        let arr = self.v.array_at(16);
        self.v
            .str_ptr_at(arr.elem_offset(index, PASS_DATA_SIZE))
            .unwrap_or("")
    }

    pub fn config_names(&self) -> NameTable<'a> {
        self.name_table(24)
    }

    pub fn variant_names(&self) -> NameTable<'a> {
        self.name_table(36)
    }

    pub fn subvariant_names(&self) -> NameTable<'a> {
        self.name_table(48)
    }

    fn name_table(&self, off: usize) -> NameTable<'a> {
        NameTable {
            v: self.v,
            count: self.v.i32_at(off).max(0) as usize,
            names_base: self.v.ptr_at(off + 4).unwrap_or(0),
            hashes_base: self.v.ptr_at(off + 8).unwrap_or(0),
        }
    }

    pub fn build_tuple_count(&self) -> usize {
        self.v.array_at(60).count
    }

    pub fn build_tuple(&self, index: usize) -> BuildTupleView<'a> {
        let arr = self.v.array_at(60);
        BuildTupleView {
            v: self.v,
            off: arr.elem_offset(index, BUILD_TUPLE_SIZE),
        }
    }

    pub fn default_config_index(&self) -> i32 {
        self.v.i32_at(68)
    }

    pub fn default_variant_index(&self) -> i32 {
        self.v.i32_at(72)
    }

    pub fn default_subvariant_index(&self) -> i32 {
        self.v.i32_at(76)
    }

    /// Snapshot of (path, mtime) for the files that produced this DAG.
    pub fn file_signatures(&self) -> impl Iterator<Item = (&'a str, u64)> + 'a {
        let arr = self.v.array_at(80);
        let v = self.v;
        (0..arr.count).map(move |i| {
            let off = arr.elem_offset(i, FILE_SIGNATURE_SIZE);
            (v.str_ptr_at(off).unwrap_or(""), v.u64_at(off + 8))
        })
    }

    /// (directory path, digest of its sorted listing) records.
    pub fn glob_signatures(&self) -> impl Iterator<Item = (&'a str, HashDigest)> + 'a {
        let arr = self.v.array_at(88);
        let v = self.v;
        (0..arr.count).map(move |i| {
            let off = arr.elem_offset(i, GLOB_SIGNATURE_SIZE);
            (v.str_ptr_at(off).unwrap_or(""), v.digest_at(off + 4))
        })
    }

    /// Hashes of filename extensions that select content-digest signing.
    pub fn digest_extension_hashes(&self) -> Vec<u32> {
        self.v.array_at(96).iter_u32().collect()
    }

    pub fn max_expensive_count(&self) -> i32 {
        self.v.i32_at(104)
    }
}

/// One build tuple: a (config, variant, subvariant) triple and its node
/// sets.
#[derive(Clone, Copy)]
pub struct BuildTupleView<'a> {
    v: FrozenView<'a>,
    off: usize,
}

impl<'a> BuildTupleView<'a> {
    pub fn config_index(&self) -> i32 {
        self.v.i32_at(self.off)
    }

    pub fn variant_index(&self) -> i32 {
        self.v.i32_at(self.off + 4)
    }

    pub fn subvariant_index(&self) -> i32 {
        self.v.i32_at(self.off + 8)
    }

    /// Nodes built when no explicit target is named.
    pub fn default_nodes(&self) -> impl Iterator<Item = i32> + 'a {
        self.v.array_at(self.off + 12).iter_i32()
    }

    /// Nodes built on every invocation of this tuple.
    pub fn always_nodes(&self) -> impl Iterator<Item = i32> + 'a {
        self.v.array_at(self.off + 20).iter_i32()
    }

    /// (name, node index) pairs for target lookup.
    pub fn named_nodes(&self) -> impl Iterator<Item = (&'a str, i32)> + 'a {
        let arr = self.v.array_at(self.off + 28);
        let v = self.v;
        (0..arr.count).map(move |i| {
            let off = arr.elem_offset(i, NAMED_NODE_SIZE);
            (v.str_ptr_at(off).unwrap_or(""), v.i32_at(off + 4))
        })
    }
}

/// Parallel name/hash tables for configs, variants and subvariants.
#[derive(Clone, Copy)]
pub struct NameTable<'a> {
    v: FrozenView<'a>,
    count: usize,
    names_base: usize,
    hashes_base: usize,
}

impl<'a> NameTable<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn name(&self, index: usize) -> &'a str {
        self.v.str_ptr_at(self.names_base + 4 * index).unwrap_or("")
    }

    pub fn hash(&self, index: usize) -> u32 {
        self.v.u32_at(self.hashes_base + 4 * index)
    }

    pub fn find_hash(&self, hash: u32) -> Option<usize> {
        (0..self.count).find(|&i| self.hash(i) == hash)
    }
}

#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    v: FrozenView<'a>,
    off: usize,
}

impl<'a> NodeView<'a> {
    pub fn action(&self) -> &'a str {
        self.v.str_ptr_at(self.off).unwrap_or("")
    }

    pub fn pre_action(&self) -> Option<&'a str> {
        self.v.str_ptr_at(self.off + 4)
    }

    pub fn annotation(&self) -> &'a str {
        self.v.str_ptr_at(self.off + 8).unwrap_or("")
    }

    pub fn pass_index(&self) -> i32 {
        self.v.i32_at(self.off + 12)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = i32> + 'a {
        self.v.array_at(self.off + 16).iter_i32()
    }

    pub fn dependency_count(&self) -> usize {
        self.v.array_at(self.off + 16).count
    }

    /// Reverse links, precomputed by the DAG producer.
    pub fn back_links(&self) -> impl Iterator<Item = i32> + 'a {
        self.v.array_at(self.off + 24).iter_i32()
    }

    pub fn input_files(&self) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        self.v.array_at(self.off + 32).iter_file_and_hash()
    }

    pub fn input_file_count(&self) -> usize {
        self.v.array_at(self.off + 32).count
    }

    pub fn output_files(&self) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        self.v.array_at(self.off + 40).iter_file_and_hash()
    }

    pub fn output_file_count(&self) -> usize {
        self.v.array_at(self.off + 40).count
    }

    pub fn aux_output_files(&self) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        self.v.array_at(self.off + 48).iter_file_and_hash()
    }

    pub fn allowed_output_substrings(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.v.array_at(self.off + 56).iter_str()
    }

    pub fn env_vars(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let arr = self.v.array_at(self.off + 64);
        let v = self.v;
        (0..arr.count).map(move |i| {
            let off = arr.elem_offset(i, ENV_VAR_SIZE);
            (
                v.str_ptr_at(off).unwrap_or(""),
                v.str_ptr_at(off + 4).unwrap_or(""),
            )
        })
    }

    pub fn scanner(&self) -> Option<ScannerView<'a>> {
        self.v.ptr_at(self.off + 72).map(|off| ScannerView { v: self.v, off })
    }

    pub fn flags(&self) -> u32 {
        self.v.u32_at(self.off + 76)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags() & flag != 0
    }
}

#[derive(Clone, Copy)]
pub struct ScannerView<'a> {
    v: FrozenView<'a>,
    off: usize,
}

impl<'a> ScannerView<'a> {
    pub fn kind(&self) -> ScannerKind {
        match self.v.i32_at(self.off) {
            0 => ScannerKind::Cpp,
            _ => ScannerKind::Generic,
        }
    }

    pub fn include_paths(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.v.array_at(self.off + 4).iter_str()
    }

    /// Digest over scanner kind and include paths; folded into scan cache
    /// keys so distinct scanners over one file never collide.
    pub fn guid(&self) -> HashDigest {
        self.v.digest_at(self.off + 12)
    }

    /// Generic scanner tuning bits; zero for the C/C++ scanner.
    pub fn generic_flags(&self) -> u32 {
        match self.kind() {
            ScannerKind::Cpp => 0,
            ScannerKind::Generic => self.v.u32_at(self.off + 28),
        }
    }

    pub fn keywords(&self) -> Vec<Keyword<'a>> {
        match self.kind() {
            ScannerKind::Cpp => Vec::new(),
            ScannerKind::Generic => {
                let arr = self.v.array_at(self.off + 32);
                let v = self.v;
                (0..arr.count)
                    .map(|i| {
                        let off = arr.elem_offset(i, KEYWORD_DATA_SIZE);
                        Keyword {
                            text: v.str_ptr_at(off).unwrap_or(""),
                            should_follow: v.u8_at(off + 6) != 0,
                        }
                    })
                    .collect()
            }
        }
    }
}

/// One generic-scanner keyword: the text to match and whether a matched
/// include should itself be scanned.
#[derive(Clone, Copy, Debug)]
pub struct Keyword<'a> {
    pub text: &'a str,
    pub should_follow: bool,
}
