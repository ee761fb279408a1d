/// Number of small palettes a cache retains.
pub const PALETTE_CACHE_CAPACITY: usize = 256;

/// Fixed-size FIFO of recently transmitted small palettes.
///
/// Entries are addressed by their position counted from the oldest retained
/// palette. Until the ring wraps that position equals the ring slot. Once the
/// ring is full each push evicts the oldest palette.
#[derive(Debug, Clone)]
pub struct PaletteCache<const COLORS: usize> {
    slots: Vec<[u8; COLORS]>,
    head: Option<usize>,
    count: usize,
}

impl<const COLORS: usize> PaletteCache<COLORS> {
    pub fn new() -> Self {
        Self {
            slots: vec![[0u8; COLORS]; PALETTE_CACHE_CAPACITY],
            head: None,
            count: 0,
        }
    }

    /// Store `palette` in the next ring slot and return its index.
    pub fn push(&mut self, palette: [u8; COLORS]) -> usize {
        let slot = match self.head {
            Some(head) => (head + 1) % PALETTE_CACHE_CAPACITY,
            None => 0,
        };
        self.slots[slot] = palette;
        self.head = Some(slot);
        self.count = (self.count + 1).min(PALETTE_CACHE_CAPACITY);
        self.count - 1
    }

    /// Forget every entry. The slot storage stays allocated.
    pub fn reset(&mut self) {
        self.head = None;
        self.count = 0;
    }

    pub fn get(&self, index: usize) -> Option<&[u8; COLORS]> {
        if index >= self.count {
            return None;
        }
        let oldest = match self.head {
            Some(head) if self.count == PALETTE_CACHE_CAPACITY => {
                (head + 1) % PALETTE_CACHE_CAPACITY
            }
            _ => 0,
        };
        self.slots.get((oldest + index) % PALETTE_CACHE_CAPACITY)
    }

    /// Ring slot written by the most recent push.
    #[inline]
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<const COLORS: usize> Default for PaletteCache<COLORS> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three caches a decoder keeps, one per small-palette size.
#[derive(Debug, Clone, Default)]
pub struct PaletteCaches {
    pub two: PaletteCache<2>,
    pub four: PaletteCache<4>,
    pub eight: PaletteCache<8>,
}

impl PaletteCaches {
    pub fn reset(&mut self) {
        self.two.reset();
        self.four.reset();
        self.eight.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette(n: usize) -> [u8; 2] {
        [(n & 0xFF) as u8, (n >> 8) as u8]
    }

    #[test]
    fn evicts_oldest_once_full() {
        let mut cache = PaletteCache::<2>::new();
        for n in 0..300 {
            cache.push(palette(n));
        }
        assert_eq!(cache.len(), 256);
        assert_eq!(cache.get(0), Some(&palette(44)));
        assert_eq!(cache.get(255), Some(&palette(299)));
        assert_eq!(cache.get(256), None);
        assert_eq!(cache.head(), Some(299 % 256));
    }

    #[test]
    fn indices_match_slots_before_wrapping() {
        let mut cache = PaletteCache::<4>::new();
        assert!(cache.is_empty());
        assert_eq!(cache.push([1, 2, 3, 4]), 0);
        assert_eq!(cache.push([5, 6, 7, 8]), 1);
        assert_eq!(cache.head(), Some(1));
        assert_eq!(cache.get(1), Some(&[5, 6, 7, 8]));
        assert_eq!(cache.get(2), None);
    }

    #[test]
    fn reset_empties_all_caches() {
        let mut caches = PaletteCaches::default();
        caches.two.push([1, 2]);
        caches.eight.push([0; 8]);
        caches.reset();
        assert!(caches.two.is_empty());
        assert!(caches.eight.is_empty());
        assert_eq!(caches.two.head(), None);
        assert_eq!(caches.two.get(0), None);
        assert_eq!(caches.two.push([9, 9]), 0);
    }
}
