//! Content digests and string hashing.
//!
//! The 16-byte digest is produced by four parallel 32-bit lanes of an
//! xxhash-style mix, fed in fixed 64-byte blocks. Hashing fixed-size blocks
//! keeps the inner loop free of tail handling; the tail is dealt with once,
//! in [`HashState::finalize`].

use std::fmt;

/// True when path hashing and path key comparison must fold ASCII case.
pub const CASE_INSENSITIVE_FILESYSTEM: bool = cfg!(any(windows, target_os = "macos"));

const PRIME32_1: u32 = 2_654_435_761;
const PRIME32_2: u32 = 2_246_822_519;
const PRIME32_3: u32 = 3_266_489_917;

const LANE_SEEDS: [u32; 4] = [0x89ca_f13a, 0x179f_a534, 0x5199_afcc, 0xef90_1315];

const BLOCK_SIZE: usize = 64;

/// 16-byte content digest. Ordering is the lexicographic order of the bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HashDigest(pub [u8; 16]);

pub const DIGEST_STRING_SIZE: usize = 32;

impl HashDigest {
    /// XOR `value` into the first 64-bit word. Used to fold a path hash into
    /// a scanner GUID when forming scan cache keys.
    pub fn xor_first_word(&mut self, value: u64) {
        let w = u64::from_le_bytes(self.0[0..8].try_into().unwrap());
        self.0[0..8].copy_from_slice(&(w ^ value).to_le_bytes());
    }

    pub fn parse_hex(s: &str) -> Option<HashDigest> {
        if s.len() != DIGEST_STRING_SIZE {
            return None;
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).ok()?;
        }
        Some(HashDigest(out))
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashDigest({})", self)
    }
}

/// Streaming hash state. Feed it with [`update`](Self::update) and friends,
/// then call [`finalize`](Self::finalize) exactly once.
pub struct HashState {
    lanes: [[u32; 4]; 4],
    msg_size_bits: u64,
    buf_used: usize,
    buffer: [u8; BLOCK_SIZE],
}

impl Default for HashState {
    fn default() -> Self {
        Self::new()
    }
}

impl HashState {
    pub fn new() -> HashState {
        let mut lanes = [[0u32; 4]; 4];
        for (lane, seed) in lanes.iter_mut().zip(LANE_SEEDS) {
            lane[0] = seed.wrapping_add(PRIME32_1).wrapping_add(PRIME32_2);
            lane[1] = seed.wrapping_add(PRIME32_2);
            lane[2] = seed;
            lane[3] = seed.wrapping_sub(PRIME32_1);
        }
        HashState {
            lanes,
            msg_size_bits: 0,
            buf_used: 0,
            buffer: [0u8; BLOCK_SIZE],
        }
    }

    fn process_block(&mut self, block: &[u8; BLOCK_SIZE]) {
        let mut words = [0u32; 16];
        for (i, w) in words.iter_mut().enumerate() {
            *w = u32::from_le_bytes(block[4 * i..4 * i + 4].try_into().unwrap());
        }

        let mut word = words.iter();
        for lane in &mut self.lanes {
            for v in lane.iter_mut() {
                let acc = v.wrapping_add(word.next().unwrap().wrapping_mul(PRIME32_2));
                *v = acc.rotate_left(13).wrapping_mul(PRIME32_1);
            }
        }
    }

    /// Add arbitrary bytes.
    pub fn update(&mut self, mut data: &[u8]) {
        self.msg_size_bits += (data.len() as u64) * 8;

        while !data.is_empty() {
            if self.buf_used != 0 || data.len() < BLOCK_SIZE {
                let space = BLOCK_SIZE - self.buf_used;
                let take = data.len().min(space);
                self.buffer[self.buf_used..self.buf_used + take].copy_from_slice(&data[..take]);
                self.buf_used += take;
                data = &data[take..];

                if self.buf_used == BLOCK_SIZE {
                    let block = self.buffer;
                    self.process_block(&block);
                    self.buf_used = 0;
                }
            } else {
                let (block, rest) = data.split_at(BLOCK_SIZE);
                self.process_block(block.try_into().unwrap());
                data = rest;
            }
        }
    }

    pub fn add_string(&mut self, s: &str) {
        self.update(s.as_bytes());
    }

    /// Add a path string, folding ASCII case on case-insensitive file systems.
    pub fn add_path(&mut self, path: &str) {
        if CASE_INSENSITIVE_FILESYSTEM {
            for chunk in path.as_bytes().chunks(BLOCK_SIZE) {
                let mut folded = [0u8; BLOCK_SIZE];
                for (dst, src) in folded.iter_mut().zip(chunk) {
                    *dst = fold_case(*src);
                }
                self.update(&folded[..chunk.len()]);
            }
        } else {
            self.update(path.as_bytes());
        }
    }

    /// Add a 64-bit integer, big-endian.
    pub fn add_integer(&mut self, value: u64) {
        self.update(&value.to_be_bytes());
    }

    /// Add a zero byte to keep runs of separate data apart.
    pub fn add_separator(&mut self) {
        self.update(&[0u8]);
    }

    /// Append the trailing one-bit, pad, mix in the bit count and reduce the
    /// four lanes to the digest. The state must not be used afterwards.
    pub fn finalize(mut self) -> HashDigest {
        let count_data = self.msg_size_bits.to_be_bytes();

        self.update(&[0x80]);

        const ZEROES: [u8; 2 * BLOCK_SIZE] = [0u8; 2 * BLOCK_SIZE];
        let tail = BLOCK_SIZE - 8;
        let pad = if self.buf_used <= tail {
            tail - self.buf_used
        } else {
            BLOCK_SIZE + tail - self.buf_used
        };
        self.update(&ZEROES[..pad]);
        debug_assert_eq!(self.buf_used, tail);

        self.update(&count_data);
        debug_assert_eq!(self.buf_used, 0);

        let mut digest = [0u8; 16];
        for (i, lane) in self.lanes.iter().enumerate() {
            let mut h32 = lane[0]
                .rotate_left(1)
                .wrapping_add(lane[1].rotate_left(7))
                .wrapping_add(lane[2].rotate_left(12))
                .wrapping_add(lane[3].rotate_left(18));

            h32 ^= h32 >> 15;
            h32 = h32.wrapping_mul(PRIME32_2);
            h32 ^= h32 >> 13;
            h32 = h32.wrapping_mul(PRIME32_3);
            h32 ^= h32 >> 16;

            digest[4 * i..4 * i + 4].copy_from_slice(&h32.to_le_bytes());
        }
        HashDigest(digest)
    }
}

/// Digest of a single string; convenience for GUID construction.
pub fn hash_single_string(s: &str) -> HashDigest {
    let mut h = HashState::new();
    h.add_string(s);
    h.finalize()
}

/// Branch-free ASCII lowercase fold.
#[inline]
pub fn fold_case(c: u8) -> u8 {
    c | (((c.wrapping_sub(b'A') < 26) as u8) << 5)
}

/// djb2 string hash. Zero is reserved for empty hash table slots, so a zero
/// result is nudged to one.
pub fn djb2_hash(s: &str) -> u32 {
    let mut hash: u32 = 5381;
    for &c in s.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(c as u32);
    }
    if hash == 0 { 1 } else { hash }
}

pub fn djb2_hash_no_case(s: &str) -> u32 {
    let mut hash: u32 = 5381;
    for &c in s.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(fold_case(c) as u32);
    }
    if hash == 0 { 1 } else { hash }
}

pub fn djb2_hash_64(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for &c in s.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(c as u64);
    }
    if hash == 0 { 1 } else { hash }
}

pub fn djb2_hash_no_case_64(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for &c in s.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(fold_case(c) as u64);
    }
    if hash == 0 { 1 } else { hash }
}

/// Hash of a path string, folding case when the host file system does.
pub fn djb2_hash_path(s: &str) -> u32 {
    if CASE_INSENSITIVE_FILESYSTEM {
        djb2_hash_no_case(s)
    } else {
        djb2_hash(s)
    }
}

pub fn djb2_hash_path_64(s: &str) -> u64 {
    if CASE_INSENSITIVE_FILESYSTEM {
        djb2_hash_no_case_64(s)
    } else {
        djb2_hash_64(s)
    }
}
