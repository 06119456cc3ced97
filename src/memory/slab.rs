//! Slab buffers for the small allocation path

use bytes::BytesMut;

/// One contiguous buffer segmented into `slot_count` equal chunks.
///
/// The occupancy flags run parallel to the slots.
#[derive(Debug)]
pub struct Slab {
    /// Backing memory, `slot_count * chunk_size` bytes
    buffer: BytesMut,
    /// Size of each slot in bytes
    chunk_size: usize,
    /// Occupied flag per slot
    slots: Vec<bool>,
}

impl Slab {
    /// Create a zeroed slab with all slots free
    pub fn new(chunk_size: usize, slot_count: usize) -> Self {
        Self {
            buffer: BytesMut::zeroed(chunk_size * slot_count),
            chunk_size,
            slots: vec![false; slot_count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Mark the lowest free slot occupied and return its index
    pub fn occupy_first_free(&mut self) -> Option<usize> {
        let index = self.slots.iter().position(|occupied| !occupied)?;
        self.slots[index] = true;
        Some(index)
    }

    /// Clear an occupied slot and zero its bytes. Returns `false` if it was not occupied.
    pub fn release(&mut self, slot_index: usize) -> bool {
        match self.slots.get_mut(slot_index) {
            Some(occupied) if *occupied => {
                *occupied = false;
                let start = slot_index * self.chunk_size;
                self.buffer[start..start + self.chunk_size].fill(0);
                true
            }
            _ => false,
        }
    }

    pub fn is_occupied(&self, slot_index: usize) -> bool {
        self.slots.get(slot_index).copied().unwrap_or(false)
    }

    /// Zero the contents. Used when the last slot is freed.
    pub fn invalidate(&mut self) {
        self.buffer.fill(0);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_creation() {
        let slab = Slab::new(30, 127);
        assert_eq!(slab.slot_count(), 127);
        assert_eq!(slab.chunk_size(), 30);
        assert_eq!(slab.bytes().len(), 30 * 127);
        assert!(slab.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slab = Slab::new(8, 4);

        assert_eq!(slab.occupy_first_free(), Some(0));
        assert_eq!(slab.occupy_first_free(), Some(1));
        assert!(slab.is_occupied(1));

        assert!(slab.release(0));
        assert!(!slab.release(0));
        assert!(!slab.release(99));

        // Lowest free index wins
        assert_eq!(slab.occupy_first_free(), Some(0));
        assert_eq!(slab.occupy_first_free(), Some(2));
        assert_eq!(slab.occupy_first_free(), Some(3));
        assert_eq!(slab.occupy_first_free(), None);
    }

    #[test]
    fn test_release_zeroes_slot() {
        let mut slab = Slab::new(4, 4);
        slab.occupy_first_free();
        slab.occupy_first_free();
        slab.bytes_mut()[..8].fill(0x41);

        assert!(slab.release(0));
        assert!(slab.bytes()[..4].iter().all(|&b| b == 0));
        // Neighbour keeps its contents
        assert!(slab.bytes()[4..8].iter().all(|&b| b == 0x41));
    }

    #[test]
    fn test_invalidate() {
        let mut slab = Slab::new(4, 4);
        slab.bytes_mut()[5] = 0xAB;
        slab.invalidate();
        assert_eq!(slab.bytes()[5], 0);
        assert_eq!(slab.bytes().len(), 16);
    }
}
