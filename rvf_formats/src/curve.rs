//! Hilbert curve ordering of the block grid.
//!
//! Blocks travel through the bitstream along a Hilbert curve laid over the
//! smallest power-of-two square that holds the block grid, with the grid
//! centred inside it. The table built here maps every raster block position
//! to its position along that curve. The encoder uses the same construction,
//! so the table has to match it exactly.

/// Coordinates of the first four curve points, indexed by the lowest index digit.
const BASE_POINTS: [(usize, usize); 4] = [(0, 0), (0, 1), (1, 1), (1, 0)];

/// Placement of a sub-square inside the next larger square, selected by one
/// base-4 digit of the curve index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadrantTransform {
    /// Digit 0: stay in the lower-left quadrant, transposed.
    Swap,
    /// Digit 1: move up one half.
    Up,
    /// Digit 2: move up and right one half.
    Diagonal,
    /// Digit 3: move right one half, reflected across the anti-diagonal.
    Reflect,
}

impl QuadrantTransform {
    pub fn from_digit(digit: usize) -> Self {
        match digit & 0b11 {
            0 => QuadrantTransform::Swap,
            1 => QuadrantTransform::Up,
            2 => QuadrantTransform::Diagonal,
            _ => QuadrantTransform::Reflect,
        }
    }

    /// Map a point of a `half`-sized square into the doubled square.
    pub fn apply(self, (x, y): (usize, usize), half: usize) -> (usize, usize) {
        match self {
            QuadrantTransform::Swap => (y, x),
            QuadrantTransform::Up => (x, y + half),
            QuadrantTransform::Diagonal => (x + half, y + half),
            QuadrantTransform::Reflect => (half - 1 - y + half, half - 1 - x),
        }
    }
}

/// Coordinates of curve position `index` inside a `side` x `side` square.
///
/// `side` must be a power of two; indices at or beyond `side * side` wrap into
/// the square's digits and are meaningless.
pub fn hilbert_point(index: usize, side: usize) -> (usize, usize) {
    let mut point = BASE_POINTS[index & 0b11];
    let mut digits = index >> 2;
    let mut span = 4;
    while span <= side {
        point = QuadrantTransform::from_digit(digits).apply(point, span / 2);
        digits >>= 2;
        span *= 2;
    }
    point
}

/// Raster block index to bitstream (curve) position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveTable {
    blocks_width: usize,
    blocks_height: usize,
    order: Vec<usize>,
}

impl CurveTable {
    pub fn build(blocks_width: usize, blocks_height: usize) -> Self {
        let cells = blocks_width * blocks_height;
        let side = blocks_width.max(blocks_height).max(1).next_power_of_two();
        let offset_x = (side - blocks_width) / 2;
        let offset_y = (side - blocks_height) / 2;

        let mut order = vec![0usize; cells];
        let mut sequence = 0usize;
        for index in 0..side * side {
            if sequence == cells {
                break;
            }
            let (x, y) = hilbert_point(index, side);
            let inside_x = x >= offset_x && x < offset_x + blocks_width;
            let inside_y = y >= offset_y && y < offset_y + blocks_height;
            if inside_x && inside_y {
                order[(x - offset_x) + (y - offset_y) * blocks_width] = sequence;
                sequence += 1;
            }
        }

        Self {
            blocks_width,
            blocks_height,
            order,
        }
    }

    #[inline]
    pub fn blocks_width(&self) -> usize {
        self.blocks_width
    }

    #[inline]
    pub fn blocks_height(&self) -> usize {
        self.blocks_height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Curve position of the block at raster index `raster`.
    #[inline]
    pub fn get(&self, raster: usize) -> Option<usize> {
        self.order.get(raster).copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }
}
