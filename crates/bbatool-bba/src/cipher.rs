//! BBA cipher engine.
//!
//! BBA archives encrypt every structural region with a generalized Feistel
//! block cipher over an array of 32-bit words (XXTEA-shaped, with its own
//! round function). Two parameter sets exist per archive variant: one for
//! the header region (the Directory Header) and one for the file region
//! (the directory blob and block-ciphered payloads).
//!
//! Gzip-compressed payloads are additionally scrambled with a light 4-word
//! XOR permutation at the start of every 1 MiB chunk.

use bbatool_common::words;

use crate::{Error, Result};

/// Chunk size for payload streaming and payload scrambling.
pub const ONE_MIB: usize = 1 << 20;

/// Parameters for one application of the block cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherParams {
    /// Amount added to the running sum every round.
    pub delta: u32,
    /// Number of full passes over the word array.
    pub rounds: u32,
    /// Key schedule.
    pub keys: [u32; 4],
}

impl CipherParams {
    /// Return a copy with every key XORed by `mask`.
    ///
    /// Block-ciphered payloads are keyed by the file-region keys masked with
    /// the entry's name length.
    pub const fn with_key_mask(self, mask: u32) -> Self {
        Self {
            delta: self.delta,
            rounds: self.rounds,
            keys: [
                self.keys[0] ^ mask,
                self.keys[1] ^ mask,
                self.keys[2] ^ mask,
                self.keys[3] ^ mask,
            ],
        }
    }
}

/// Which structural region a cipher call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// The Directory Header block following the plaintext header.
    Header,
    /// The directory blob and block-ciphered file payloads.
    File,
}

/// Whether to run the cipher forwards or backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Cipher variant of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Variant {
    /// Retail game archives.
    Product,
    /// Demo build archives.
    Demo,
}

/// The complete cipher configuration of one archive variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantConfig {
    /// The variant this configuration belongs to.
    pub variant: Variant,
    /// Header-region parameters.
    pub header: CipherParams,
    /// File-region parameters.
    pub file: CipherParams,
    /// XOR constants of the compressed-payload scramble.
    pub payload_xor: [u32; 4],
}

impl VariantConfig {
    /// Parameters for a region.
    #[inline]
    pub const fn params(&self, region: Region) -> &CipherParams {
        match region {
            Region::Header => &self.header,
            Region::File => &self.file,
        }
    }
}

const HEADER_KEYS: [u32; 4] = [0x2523_A2B0, 0xD544_212F, 0x1990_3D04, 0x0C99_F6B8];
const FILE_KEYS: [u32; 4] = [0x3531_43E3, 0xDCAB_0E87, 0xB6AA_213D, 0x0B4F_DA8C];

static PRODUCT: VariantConfig = VariantConfig {
    variant: Variant::Product,
    header: CipherParams {
        delta: 0x496C_97A3,
        rounds: 7,
        keys: HEADER_KEYS,
    },
    file: CipherParams {
        delta: 0x5B54_C3DE,
        rounds: 8,
        keys: FILE_KEYS,
    },
    payload_xor: [0x040E_382C, 0x09F3_3820, 0x6680_7977, 0xFD28_DF48],
};

static DEMO: VariantConfig = VariantConfig {
    variant: Variant::Demo,
    header: CipherParams {
        delta: 0x436C_97A3,
        rounds: 6,
        keys: HEADER_KEYS,
    },
    file: CipherParams {
        delta: 0x5B50_C3DE,
        rounds: 9,
        keys: FILE_KEYS,
    },
    payload_xor: [0x2E8C_B0ED, 0xD2E5_D057, 0xAAC1_2042, 0xC0FD_E6CB],
};

impl Variant {
    /// Variants in detection order.
    pub const DETECTION_ORDER: [Variant; 2] = [Variant::Product, Variant::Demo];

    /// The cipher configuration of this variant.
    #[inline]
    pub fn config(self) -> &'static VariantConfig {
        match self {
            Self::Product => &PRODUCT,
            Self::Demo => &DEMO,
        }
    }

    /// Short lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Demo => "demo",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline(always)]
const fn feistel(y: u32, z: u32, sum: u32, key: u32) -> u32 {
    ((y >> 5 ^ z << 2).wrapping_add(y << 4 ^ z >> 3)) ^ ((sum ^ z).wrapping_add(key ^ y))
}

/// Encrypt a word array in place.
///
/// The array must hold at least two words.
pub fn encrypt_words(values: &mut [u32], params: &CipherParams) -> Result<()> {
    let n = values.len();
    if n < 2 {
        return Err(Error::InvalidWordBuffer(n * 4));
    }

    let keys = &params.keys;
    let mut sum = 0u32;

    for _ in 0..params.rounds {
        sum = sum.wrapping_add(params.delta);
        let e = ((sum >> 2) & 3) as usize;

        let mut y = values[n - 1];
        for p in 0..n - 1 {
            let z = values[p + 1];
            values[p] = values[p].wrapping_add(feistel(y, z, sum, keys[(p & 3) ^ e]));
            y = values[p];
        }

        let z = values[0];
        values[n - 1] =
            values[n - 1].wrapping_add(feistel(y, z, sum, keys[((n - 1) & 3) ^ e]));
    }

    Ok(())
}

/// Decrypt a word array in place.
///
/// The array must hold at least two words.
pub fn decrypt_words(values: &mut [u32], params: &CipherParams) -> Result<()> {
    let n = values.len();
    if n < 2 {
        return Err(Error::InvalidWordBuffer(n * 4));
    }

    let keys = &params.keys;
    let mut sum = params.rounds.wrapping_mul(params.delta);

    for _ in 0..params.rounds {
        let e = ((sum >> 2) & 3) as usize;

        let mut z = values[0];
        for p in (1..n).rev() {
            let y = values[p - 1];
            values[p] = values[p].wrapping_sub(feistel(y, z, sum, keys[(p & 3) ^ e]));
            z = values[p];
        }

        let y = values[n - 1];
        values[0] = values[0].wrapping_sub(feistel(y, z, sum, keys[e]));
        sum = sum.wrapping_sub(params.delta);
    }

    Ok(())
}

/// Run the block cipher over a byte buffer in place.
///
/// The buffer length must be a multiple of four and at least eight bytes.
pub fn apply_in_place(data: &mut [u8], params: &CipherParams, direction: Direction) -> Result<()> {
    if data.len() % 4 != 0 || data.len() < 8 {
        return Err(Error::InvalidWordBuffer(data.len()));
    }

    let mut values = words::from_bytes(data)?;
    match direction {
        Direction::Encrypt => encrypt_words(&mut values, params)?,
        Direction::Decrypt => decrypt_words(&mut values, params)?,
    }
    words::write_into(&values, data);
    Ok(())
}

/// Encrypt a byte buffer in place.
#[inline]
pub fn encrypt_in_place(data: &mut [u8], params: &CipherParams) -> Result<()> {
    apply_in_place(data, params, Direction::Encrypt)
}

/// Decrypt a byte buffer in place.
#[inline]
pub fn decrypt_in_place(data: &mut [u8], params: &CipherParams) -> Result<()> {
    apply_in_place(data, params, Direction::Decrypt)
}

/// Scramble the leading four words of one compressed-payload chunk.
///
/// Chunks shorter than 16 bytes carry no scramble window and are left as is.
pub fn scramble_chunk(chunk: &mut [u8], name_length: u32, xor: &[u32; 4]) {
    let Some(mut w) = read_window(chunk) else {
        return;
    };

    w[0] ^= w[3] ^ name_length ^ xor[0];
    w[1] ^= w[0] ^ name_length ^ xor[1];
    w[2] ^= w[1] ^ name_length ^ xor[2];
    w[3] ^= w[2] ^ name_length ^ xor[3];

    words::write_into(&w, &mut chunk[..16]);
}

/// Reverse [`scramble_chunk`].
pub fn unscramble_chunk(chunk: &mut [u8], name_length: u32, xor: &[u32; 4]) {
    let Some(mut w) = read_window(chunk) else {
        return;
    };

    w[3] ^= w[2] ^ name_length ^ xor[3];
    w[2] ^= w[1] ^ name_length ^ xor[2];
    w[1] ^= w[0] ^ name_length ^ xor[1];
    w[0] ^= w[3] ^ name_length ^ xor[0];

    words::write_into(&w, &mut chunk[..16]);
}

fn read_window(chunk: &[u8]) -> Option<[u32; 4]> {
    let window = chunk.get(..16)?;
    let mut w = [0u32; 4];
    for (word, bytes) in w.iter_mut().zip(window.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    Some(w)
}

/// Apply the compressed-payload scramble to every 1 MiB chunk of `data`.
pub fn scramble_payload(data: &mut [u8], name_length: u32, xor: &[u32; 4], direction: Direction) {
    for chunk in data.chunks_mut(ONE_MIB) {
        match direction {
            Direction::Encrypt => scramble_chunk(chunk, name_length, xor),
            Direction::Decrypt => unscramble_chunk(chunk, name_length, xor),
        }
    }
}

/// Run the block cipher over one block of a block-ciphered payload.
///
/// A block shorter than `block_size` is zero-padded to a multiple of eight
/// bytes for the cipher and truncated back afterwards. Trailing bytes of a
/// full block that do not form a whole word are left untouched.
pub fn tea_block(
    block: &mut [u8],
    block_size: usize,
    name_length: u32,
    file_params: &CipherParams,
    direction: Direction,
) -> Result<()> {
    let padded_len = if block.len() == block_size {
        block_size
    } else {
        (block.len() + 7) & !7
    };

    let mut buffer = vec![0u8; padded_len];
    buffer[..block.len()].copy_from_slice(block);

    let word_len = padded_len & !3;
    let params = file_params.with_key_mask(name_length);
    apply_in_place(&mut buffer[..word_len], &params, direction)?;

    block.copy_from_slice(&buffer[..block.len()]);
    Ok(())
}

/// Run the block cipher over a whole block-ciphered payload.
pub fn tea_payload(
    data: &mut [u8],
    block_size: usize,
    name_length: u32,
    file_params: &CipherParams,
    direction: Direction,
) -> Result<()> {
    if block_size == 0 {
        return Err(Error::InvalidWordBuffer(0));
    }

    for block in data.chunks_mut(block_size) {
        tea_block(block, block_size, name_length, file_params, direction)?;
    }
    Ok(())
}
