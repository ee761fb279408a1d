//! Expansion of packed per-pixel palette selectors.
//!
//! A palettized block stores one small selector per pixel, most significant
//! bits first, in row-major order. Selectors narrower than a byte are read by
//! loading the whole packed span as one big-endian integer and shifting each
//! selector out of it, so values that straddle a byte boundary are stitched
//! together with a bitwise OR of the neighbouring bytes.

use byteorder::{BigEndian, ByteOrder};

use crate::geometry::BLOCK_LEN;

/// 2 colors: 1 bit per pixel, 16 pixels from 2 bytes.
pub fn unpack_1bit(src: &[u8; 2]) -> [u8; BLOCK_LEN] {
    let packed = BigEndian::read_u16(src);
    let mut out = [0u8; BLOCK_LEN];
    for (i, value) in out.iter_mut().enumerate() {
        *value = ((packed >> (15 - i)) & 0b1) as u8;
    }
    out
}

/// 4 colors: 2 bits per pixel, 16 pixels from 4 bytes.
pub fn unpack_2bit(src: &[u8; 4]) -> [u8; BLOCK_LEN] {
    let packed = BigEndian::read_u32(src);
    let mut out = [0u8; BLOCK_LEN];
    for (i, value) in out.iter_mut().enumerate() {
        *value = ((packed >> (30 - 2 * i)) & 0b11) as u8;
    }
    out
}

/// 8 colors: 3 bits per pixel, 16 pixels from 6 bytes.
///
/// Each 3-byte half carries 8 selectors; selectors 2, 5, 10 and 13 span two bytes.
pub fn unpack_3bit(src: &[u8; 6]) -> [u8; BLOCK_LEN] {
    let mut out = [0u8; BLOCK_LEN];
    for (half, chunk) in src.chunks_exact(3).enumerate() {
        let packed = BigEndian::read_u24(chunk);
        for i in 0..8 {
            out[half * 8 + i] = ((packed >> (21 - 3 * i)) & 0b111) as u8;
        }
    }
    out
}

/// Size of a block's small palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteWidth {
    Two,
    Four,
    Eight,
}

impl PaletteWidth {
    /// Number of palette entries.
    pub fn colors(self) -> usize {
        match self {
            PaletteWidth::Two => 2,
            PaletteWidth::Four => 4,
            PaletteWidth::Eight => 8,
        }
    }

    /// Bytes of packed selectors per block.
    pub fn packed_len(self) -> usize {
        match self {
            PaletteWidth::Two => 2,
            PaletteWidth::Four => 4,
            PaletteWidth::Eight => 6,
        }
    }
}
