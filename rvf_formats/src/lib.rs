pub mod assemble;
pub mod bits;
pub mod block;
pub mod curve;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod palette_cache;
pub mod rvf;

pub use assemble::{assemble_block_values, assemble_frame};
pub use bits::{PaletteWidth, unpack_1bit, unpack_2bit, unpack_3bit};
pub use block::{Block, BlockKind, RunHeader};
pub use curve::{CurveTable, hilbert_point};
pub use decoder::{DecodeOptions, FrameDecoder, FrameStats};
pub use error::DecodeError;
pub use geometry::{FrameGeometry, MAX_DIMENSION};
pub use palette_cache::{PALETTE_CACHE_CAPACITY, PaletteCache, PaletteCaches};
pub use rvf::{
    FrameFlags, RvfAudioInfo, RvfFile, RvfFrame, RvfHeader, RvfPalette, debug_tags_to_rgba,
};
