use crate::error::DecodeError;

/// Side length of a block in pixels.
pub const BLOCK_SIDE: usize = 4;

/// Number of palette-index bytes in one block.
pub const BLOCK_LEN: usize = BLOCK_SIDE * BLOCK_SIDE;

/// Largest accepted frame side in pixels. Keeps the curve walk and the block
/// store bounded for headers read from untrusted files.
pub const MAX_DIMENSION: u32 = 8192;

/// Frame size in pixels plus the block grid that covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    width: usize,
    height: usize,
    blocks_width: usize,
    blocks_height: usize,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Result<Self, DecodeError> {
        let invalid = DecodeError::InvalidGeometry { width, height };
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(invalid);
        }
        let width = usize::try_from(width).map_err(|_| invalid.clone())?;
        let height = usize::try_from(height).map_err(|_| invalid.clone())?;
        let blocks_width = width.div_ceil(BLOCK_SIDE);
        let blocks_height = height.div_ceil(BLOCK_SIDE);
        if width.checked_mul(height).is_none()
            || blocks_width.checked_mul(blocks_height).is_none()
        {
            return Err(invalid);
        }
        Ok(Self {
            width,
            height,
            blocks_width,
            blocks_height,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn blocks_width(&self) -> usize {
        self.blocks_width
    }

    #[inline]
    pub fn blocks_height(&self) -> usize {
        self.blocks_height
    }

    /// Bytes in one decoded frame (one palette index per pixel).
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks_width * self.blocks_height
    }
}
