// SPDX-License-Identifier: GPL-2.0-or-later
//
// RVF frame decoder.
//
// A compressed frame is a sequence of runs. Each run starts with a header byte
// whose high nibble selects the run type and whose low nibble (plus one
// extension byte for long runs) gives the biased block count. Runs fill a block
// store laid out in Hilbert curve order; the store persists between frames so
// skipped blocks keep the previous frame's pixels.

use std::io::{self, Read};

use log::{debug, trace, warn};
use serde::Serialize;

use crate::assemble::{assemble_block_values, assemble_frame};
use crate::bits::{PaletteWidth, unpack_1bit, unpack_2bit, unpack_3bit};
use crate::block::{Block, BlockKind, RunHeader};
use crate::curve::CurveTable;
use crate::error::DecodeError;
use crate::geometry::{BLOCK_LEN, FrameGeometry};
use crate::palette_cache::{PaletteCache, PaletteCaches};

/// Per-call decoder configuration.
#[derive(Debug, Default)]
pub struct DecodeOptions<'a> {
    /// When set, receives one block-type nibble (0x0-0xF) per pixel in raster
    /// order, naming the run that produced the pixel in this frame.
    pub debug_tags: Option<&'a mut [u8]>,
}

impl<'a> DecodeOptions<'a> {
    pub fn with_debug_tags(tags: &'a mut [u8]) -> Self {
        Self {
            debug_tags: Some(tags),
        }
    }
}

/// What one decode call consumed and produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// Compressed bytes consumed.
    pub bytes: usize,
    /// Runs seen per block type, indexed by tag.
    pub runs: [u64; 16],
    /// Blocks covered per block type, indexed by tag.
    pub blocks: [u64; 16],
    /// Blocks addressed past the end of the block store and dropped.
    pub discarded_blocks: u64,
}

impl FrameStats {
    pub fn runs_of(&self, kind: BlockKind) -> u64 {
        self.runs[kind.tag() as usize]
    }

    pub fn blocks_of(&self, kind: BlockKind) -> u64 {
        self.blocks[kind.tag() as usize]
    }

    /// Accumulate another frame's counters into this one.
    pub fn merge(&mut self, other: &FrameStats) {
        self.bytes += other.bytes;
        for (total, value) in self.runs.iter_mut().zip(other.runs.iter()) {
            *total += value;
        }
        for (total, value) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *total += value;
        }
        self.discarded_blocks += other.discarded_blocks;
    }
}

/// Decoder for one RVF stream geometry.
///
/// An instance is not meant to be shared between threads while decoding; use
/// one decoder per stream.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    geometry: FrameGeometry,
    curve: CurveTable,
    blocks: Vec<Block>,
    tags: Vec<u8>,
    caches: PaletteCaches,
    input: Vec<u8>,
    staged: usize,
}

impl FrameDecoder {
    pub fn new(width: u32, height: u32) -> Result<Self, DecodeError> {
        let geometry = FrameGeometry::new(width, height)?;
        let curve = CurveTable::build(geometry.blocks_width(), geometry.blocks_height());
        let block_count = geometry.block_count();
        debug!(
            "rvf decoder {}x{} ({}x{} blocks)",
            geometry.width(),
            geometry.height(),
            geometry.blocks_width(),
            geometry.blocks_height()
        );
        Ok(Self {
            geometry,
            curve,
            blocks: vec![[0u8; BLOCK_LEN]; block_count],
            tags: vec![BlockKind::Skip.tag(); block_count],
            caches: PaletteCaches::default(),
            input: Vec::new(),
            staged: 0,
        })
    }

    #[inline]
    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Bytes needed for a decoded frame.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.geometry.frame_len()
    }

    #[inline]
    pub fn curve(&self) -> &CurveTable {
        &self.curve
    }

    /// Block store in curve order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Decode one compressed frame and write its raster pixels into `dst`.
    ///
    /// On error `dst` (and the debug tag buffer) hold unspecified contents.
    pub fn decode_frame(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        options: DecodeOptions<'_>,
    ) -> Result<FrameStats, DecodeError> {
        let frame_len = self.frame_len();
        ensure_len(dst, frame_len)?;
        if let Some(tags) = options.debug_tags.as_deref() {
            ensure_len(tags, frame_len)?;
        }

        let stats = self.decode_runs(src, options.debug_tags.is_some())?;
        self.assemble(dst)?;
        if let Some(tags) = options.debug_tags {
            assemble_block_values(&self.geometry, &self.curve, &self.tags, tags)?;
        }
        Ok(stats)
    }

    /// Copy `len` bytes of compressed payload from `reader` into the decoder's
    /// input buffer for [`FrameDecoder::decode_staged`].
    ///
    /// The buffer keeps its capacity between frames, so steady-state playback
    /// does not allocate. It only grows by what the reader actually delivers.
    pub fn stage_input<R: Read>(&mut self, reader: &mut R, len: usize) -> io::Result<()> {
        self.staged = 0;
        self.input.clear();
        let limit = u64::try_from(len).unwrap_or(u64::MAX);
        let read = reader.by_ref().take(limit).read_to_end(&mut self.input)?;
        if read < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload needs {len} byte(s), stream holds {read}"),
            ));
        }
        self.staged = len;
        Ok(())
    }

    /// Decode the payload most recently staged with [`FrameDecoder::stage_input`].
    pub fn decode_staged(
        &mut self,
        dst: &mut [u8],
        options: DecodeOptions<'_>,
    ) -> Result<FrameStats, DecodeError> {
        let staged = self.staged;
        let input = std::mem::take(&mut self.input);
        let result = self.decode_frame(&input[..staged], dst, options);
        self.input = input;
        result
    }

    /// Run the block pass alone, updating the block store without producing a
    /// raster frame.
    pub fn decode_blocks(&mut self, src: &[u8]) -> Result<FrameStats, DecodeError> {
        self.decode_runs(src, false)
    }

    /// Convert the current block store to a raster frame.
    pub fn assemble(&self, dst: &mut [u8]) -> Result<(), DecodeError> {
        assemble_frame(&self.geometry, &self.curve, &self.blocks, dst)
    }

    fn decode_runs(&mut self, src: &[u8], record_tags: bool) -> Result<FrameStats, DecodeError> {
        self.caches.reset();
        if record_tags {
            self.tags.fill(BlockKind::Skip.tag());
        }

        let total = self.blocks.len();
        let mut stats = FrameStats::default();
        let mut cursor = 0usize;
        let mut position = 0usize;

        while cursor < src.len() {
            let run_offset = cursor;
            let header =
                RunHeader::parse(&src[cursor..]).ok_or_else(|| truncated(src, cursor, 2))?;
            cursor += header.len;
            let RunHeader { kind, count, .. } = header;
            trace!(
                "rvf run {} x{} at byte {} block {}",
                kind.name(),
                count,
                run_offset,
                position
            );

            match kind {
                BlockKind::Skip | BlockKind::SkipLong => {}
                BlockKind::Repeat | BlockKind::RepeatLong => {
                    if position == 0 {
                        return Err(DecodeError::RepeatWithoutPrevious { offset: run_offset });
                    }
                    let end = (position + count).min(total);
                    for target in position..end {
                        self.blocks[target] = self.blocks[target - 1];
                    }
                }
                BlockKind::Solid
                | BlockKind::SolidLong
                | BlockKind::SolidSep
                | BlockKind::SolidSepLong => {
                    let color = read_byte(src, &mut cursor)?;
                    let end = (position + count).min(total);
                    if position < end {
                        self.blocks[position..end].fill([color; BLOCK_LEN]);
                    }
                }
                BlockKind::Pal2 => {
                    let palette: [u8; 2] = read_array(src, &mut cursor)?;
                    self.caches.two.push(palette);
                    self.write_palettized::<2, 2>(
                        src,
                        &mut cursor,
                        position,
                        count,
                        &palette,
                        unpack_1bit,
                    )?;
                }
                BlockKind::Pal2Cache => {
                    let palette = *lookup(&self.caches.two, PaletteWidth::Two, src, &mut cursor)?;
                    self.write_palettized::<2, 2>(
                        src,
                        &mut cursor,
                        position,
                        count,
                        &palette,
                        unpack_1bit,
                    )?;
                }
                BlockKind::Pal4 => {
                    let palette: [u8; 4] = read_array(src, &mut cursor)?;
                    self.caches.four.push(palette);
                    self.write_palettized::<4, 4>(
                        src,
                        &mut cursor,
                        position,
                        count,
                        &palette,
                        unpack_2bit,
                    )?;
                }
                BlockKind::Pal4Cache => {
                    let palette = *lookup(&self.caches.four, PaletteWidth::Four, src, &mut cursor)?;
                    self.write_palettized::<4, 4>(
                        src,
                        &mut cursor,
                        position,
                        count,
                        &palette,
                        unpack_2bit,
                    )?;
                }
                BlockKind::Pal8 => {
                    let palette: [u8; 8] = read_array(src, &mut cursor)?;
                    self.caches.eight.push(palette);
                    self.write_palettized::<8, 6>(
                        src,
                        &mut cursor,
                        position,
                        count,
                        &palette,
                        unpack_3bit,
                    )?;
                }
                BlockKind::Pal8Cache => {
                    let palette =
                        *lookup(&self.caches.eight, PaletteWidth::Eight, src, &mut cursor)?;
                    self.write_palettized::<8, 6>(
                        src,
                        &mut cursor,
                        position,
                        count,
                        &palette,
                        unpack_3bit,
                    )?;
                }
                BlockKind::Raw | BlockKind::RawLong => {
                    for target in position..position + count {
                        let block: Block = read_array(src, &mut cursor)?;
                        if let Some(slot) = self.blocks.get_mut(target) {
                            *slot = block;
                        }
                    }
                }
            }

            let end = position + count;
            if record_tags && position < total {
                self.tags[position..end.min(total)].fill(kind.tag());
            }
            if end > total {
                stats.discarded_blocks += (end - position.max(total)) as u64;
            }
            stats.runs[kind.tag() as usize] += 1;
            stats.blocks[kind.tag() as usize] += count as u64;
            position = end;
        }

        stats.bytes = cursor;
        if stats.discarded_blocks > 0 {
            warn!(
                "rvf frame addressed {} block(s) past the {}-block store",
                stats.discarded_blocks, total
            );
        }
        debug!(
            "rvf frame decoded: {} byte(s), {} block(s) addressed",
            stats.bytes, position
        );
        Ok(stats)
    }

    fn write_palettized<const COLORS: usize, const PACKED: usize>(
        &mut self,
        src: &[u8],
        cursor: &mut usize,
        position: usize,
        count: usize,
        palette: &[u8; COLORS],
        unpack: fn(&[u8; PACKED]) -> Block,
    ) -> Result<(), DecodeError> {
        for target in position..position + count {
            let packed: [u8; PACKED] = read_array(src, cursor)?;
            let Some(slot) = self.blocks.get_mut(target) else {
                continue;
            };
            // Selector widths never exceed the palette size.
            for (pixel, selector) in slot.iter_mut().zip(unpack(&packed)) {
                *pixel = palette[usize::from(selector)];
            }
        }
        Ok(())
    }
}

fn lookup<'c, const COLORS: usize>(
    cache: &'c PaletteCache<COLORS>,
    width: PaletteWidth,
    src: &[u8],
    cursor: &mut usize,
) -> Result<&'c [u8; COLORS], DecodeError> {
    let offset = *cursor;
    let index = read_byte(src, cursor)?;
    cache
        .get(usize::from(index))
        .ok_or(DecodeError::InvalidCacheReference {
            colors: width.colors(),
            index,
            cached: cache.len(),
            offset,
        })
}

fn ensure_len(buffer: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buffer.len() < expected {
        return Err(DecodeError::DestinationTooSmall {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

fn truncated(src: &[u8], cursor: usize, needed: usize) -> DecodeError {
    DecodeError::Truncated {
        offset: cursor,
        needed,
        available: src.len().saturating_sub(cursor),
    }
}

fn read_byte(src: &[u8], cursor: &mut usize) -> Result<u8, DecodeError> {
    let value = *src.get(*cursor).ok_or_else(|| truncated(src, *cursor, 1))?;
    *cursor += 1;
    Ok(value)
}

fn read_array<const N: usize>(src: &[u8], cursor: &mut usize) -> Result<[u8; N], DecodeError> {
    let bytes = src
        .get(*cursor..*cursor + N)
        .ok_or_else(|| truncated(src, *cursor, N))?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    *cursor += N;
    Ok(out)
}
