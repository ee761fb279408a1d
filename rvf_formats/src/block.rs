use serde::Serialize;

use crate::bits::PaletteWidth;
use crate::geometry::BLOCK_LEN;

/// One 4x4 patch of global palette indices, row-major.
pub type Block = [u8; BLOCK_LEN];

/// Largest run a short header can describe.
pub const MAX_SHORT_RUN: usize = 16;

/// Largest run a long header can describe.
pub const MAX_LONG_RUN: usize = 4096;

/// Run type carried in the high nibble of every run header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum BlockKind {
    Skip = 0x0,
    SkipLong = 0x1,
    Repeat = 0x2,
    RepeatLong = 0x3,
    Solid = 0x4,
    SolidLong = 0x5,
    SolidSep = 0x6,
    SolidSepLong = 0x7,
    Pal2 = 0x8,
    Pal2Cache = 0x9,
    Pal4 = 0xA,
    Pal4Cache = 0xB,
    Pal8 = 0xC,
    Pal8Cache = 0xD,
    Raw = 0xE,
    RawLong = 0xF,
}

impl BlockKind {
    pub const ALL: [BlockKind; 16] = [
        BlockKind::Skip,
        BlockKind::SkipLong,
        BlockKind::Repeat,
        BlockKind::RepeatLong,
        BlockKind::Solid,
        BlockKind::SolidLong,
        BlockKind::SolidSep,
        BlockKind::SolidSepLong,
        BlockKind::Pal2,
        BlockKind::Pal2Cache,
        BlockKind::Pal4,
        BlockKind::Pal4Cache,
        BlockKind::Pal8,
        BlockKind::Pal8Cache,
        BlockKind::Raw,
        BlockKind::RawLong,
    ];

    /// Kind named by the high nibble of a header byte.
    #[inline]
    pub fn from_header(byte: u8) -> Self {
        Self::ALL[(byte >> 4) as usize]
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Long runs take a 12-bit length: the header's low nibble followed by one
    /// extension byte.
    pub fn is_long(self) -> bool {
        matches!(
            self,
            BlockKind::SkipLong
                | BlockKind::RepeatLong
                | BlockKind::SolidLong
                | BlockKind::SolidSepLong
                | BlockKind::RawLong
        )
    }

    /// Small palette size for palettized runs, `None` for everything else.
    pub fn palette_width(self) -> Option<PaletteWidth> {
        match self {
            BlockKind::Pal2 | BlockKind::Pal2Cache => Some(PaletteWidth::Two),
            BlockKind::Pal4 | BlockKind::Pal4Cache => Some(PaletteWidth::Four),
            BlockKind::Pal8 | BlockKind::Pal8Cache => Some(PaletteWidth::Eight),
            _ => None,
        }
    }

    /// Palettized run that names a cached palette instead of sending one.
    pub fn is_cache_reference(self) -> bool {
        matches!(
            self,
            BlockKind::Pal2Cache | BlockKind::Pal4Cache | BlockKind::Pal8Cache
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Skip => "skip",
            BlockKind::SkipLong => "skip-long",
            BlockKind::Repeat => "repeat",
            BlockKind::RepeatLong => "repeat-long",
            BlockKind::Solid => "solid",
            BlockKind::SolidLong => "solid-long",
            BlockKind::SolidSep => "solid-sep",
            BlockKind::SolidSepLong => "solid-sep-long",
            BlockKind::Pal2 => "pal2",
            BlockKind::Pal2Cache => "pal2-cache",
            BlockKind::Pal4 => "pal4",
            BlockKind::Pal4Cache => "pal4-cache",
            BlockKind::Pal8 => "pal8",
            BlockKind::Pal8Cache => "pal8-cache",
            BlockKind::Raw => "raw",
            BlockKind::RawLong => "raw-long",
        }
    }

    /// Visualization color used when rendering block-type maps.
    pub fn debug_rgb(self) -> [u8; 3] {
        match self {
            BlockKind::Skip | BlockKind::SkipLong => [0, 0, 0],
            BlockKind::Repeat | BlockKind::RepeatLong => [255, 0, 0],
            BlockKind::Solid | BlockKind::SolidLong => [0, 255, 0],
            BlockKind::SolidSep | BlockKind::SolidSepLong => [100, 255, 100],
            BlockKind::Pal2 => [255, 255, 0],
            BlockKind::Pal2Cache => [128, 255, 0],
            BlockKind::Pal4 => [255, 0, 255],
            BlockKind::Pal4Cache => [128, 0, 255],
            BlockKind::Pal8 => [0, 255, 255],
            BlockKind::Pal8Cache => [0, 128, 255],
            BlockKind::Raw | BlockKind::RawLong => [0, 0, 255],
        }
    }
}

/// Decoded run header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHeader {
    pub kind: BlockKind,
    /// Number of blocks the run covers (always at least 1).
    pub count: usize,
    /// Header bytes consumed (1, or 2 for long runs).
    pub len: usize,
}

impl RunHeader {
    /// Parse the header at the start of `bytes`. Returns `None` when `bytes` is
    /// empty or a long header is missing its extension byte.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let &first = bytes.first()?;
        let kind = BlockKind::from_header(first);
        let low = usize::from(first & 0x0F);
        if kind.is_long() {
            let &extension = bytes.get(1)?;
            Some(Self {
                kind,
                count: ((low << 8) | usize::from(extension)) + 1,
                len: 2,
            })
        } else {
            Some(Self {
                kind,
                count: low + 1,
                len: 1,
            })
        }
    }
}
