//! Curve-ordered block store to raster frame conversion.

use crate::block::Block;
use crate::curve::CurveTable;
use crate::error::DecodeError;
use crate::geometry::{BLOCK_SIDE, FrameGeometry};

/// Write the raster frame for `blocks` (indexed in curve order) into `dst`.
pub fn assemble_frame(
    geometry: &FrameGeometry,
    curve: &CurveTable,
    blocks: &[Block],
    dst: &mut [u8],
) -> Result<(), DecodeError> {
    fill_raster(geometry, curve, dst, |sequence, offset| {
        blocks[sequence][offset]
    })
}

/// Write one value per pixel taken from the per-block `values` table (indexed
/// in curve order), e.g. the block-type nibble of the run that produced it.
pub fn assemble_block_values(
    geometry: &FrameGeometry,
    curve: &CurveTable,
    values: &[u8],
    dst: &mut [u8],
) -> Result<(), DecodeError> {
    fill_raster(geometry, curve, dst, |sequence, _| values[sequence])
}

fn fill_raster<F>(
    geometry: &FrameGeometry,
    curve: &CurveTable,
    dst: &mut [u8],
    mut pixel: F,
) -> Result<(), DecodeError>
where
    F: FnMut(usize, usize) -> u8,
{
    let width = geometry.width();
    let frame_len = geometry.frame_len();
    if dst.len() < frame_len {
        return Err(DecodeError::DestinationTooSmall {
            expected: frame_len,
            actual: dst.len(),
        });
    }

    let sequences = curve.as_slice();
    for (y, row) in dst[..frame_len].chunks_exact_mut(width).enumerate() {
        let block_row = (y / BLOCK_SIDE) * geometry.blocks_width();
        let row_in_block = (y % BLOCK_SIDE) * BLOCK_SIDE;
        for (x, out) in row.iter_mut().enumerate() {
            let sequence = sequences[block_row + x / BLOCK_SIDE];
            *out = pixel(sequence, row_in_block + x % BLOCK_SIDE);
        }
    }
    Ok(())
}
