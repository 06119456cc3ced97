//! Size class management for the slab pool

use super::address::{Handle, SIZE_INDEX_BITS};
use super::slab::Slab;
use crate::error::{Error, Result};
use tracing::debug;

pub const MIN_CHUNK_SIZE: usize = 1;
pub const MAX_CHUNK_SIZE: usize = 1 << SIZE_INDEX_BITS;

/// Upper bound of slots per slab. Keeps slot positions cheap to pack.
pub const MAX_SLOT_COUNT: usize = i8::MAX as usize;

/// Lower bound of slots per slab for the largest chunk sizes.
pub const MIN_SLOT_COUNT: usize = 4;

pub const DEFAULT_SLAB_BUFFER_SIZE: usize = 4096;

/// Chain positions added per growth step.
pub const DEFAULT_CHAIN_INCREMENT: usize = 8;

pub fn to_size_index(chunk_size: usize) -> u16 {
    // size 0 never reaches a size class, but 2^10 must fit into 10 bits
    (chunk_size - 1) as u16
}

pub fn to_chunk_size(size_index: u16) -> usize {
    size_index as usize + 1
}

/// Smallest chunk size for which no more than `slots` chunks fit into the buffer
fn min_chunk_size_for(slots: usize, buffer_size: usize) -> usize {
    1 + buffer_size / (slots + 1)
}

/// Number of slots per slab for a chunk size.
///
/// Step function, non-increasing in `chunk_size`: small chunks saturate at
/// [`MAX_SLOT_COUNT`], chunks close to 1024 bytes bottom out at
/// [`MIN_SLOT_COUNT`] instead of producing near-empty slabs.
pub fn calculate_slot_count(chunk_size: usize, buffer_size: usize) -> usize {
    if chunk_size >= min_chunk_size_for(8, buffer_size) {
        for slots in MIN_SLOT_COUNT..8 {
            if chunk_size >= min_chunk_size_for(slots, buffer_size) {
                return slots;
            }
        }
        return 8;
    }

    if chunk_size < min_chunk_size_for(MAX_SLOT_COUNT - 1, buffer_size) {
        return MAX_SLOT_COUNT;
    }

    buffer_size / chunk_size
}

/// A size class owns the chain of slabs for one chunk size
///
/// Chain positions are materialized lazily. The occupancy counters run
/// parallel to the chain and never exceed `slot_count`.
#[derive(Debug)]
pub struct SizeClass {
    /// Size of slots in this class (bytes)
    pub chunk_size: usize,
    /// Index of this size class
    pub index: u16,
    /// Slots per slab
    pub slot_count: usize,
    /// Slab per chain position, `None` until first used
    slabs: Vec<Option<Slab>>,
    /// Occupied slots per chain position
    occupancy: Vec<u8>,
}

impl SizeClass {
    /// Create a size class with `initial_length` unmaterialized chain positions
    pub fn new(chunk_size: usize, slot_count: usize, initial_length: usize) -> Self {
        let mut slabs = Vec::with_capacity(initial_length);
        slabs.resize_with(initial_length, || None);

        Self {
            chunk_size,
            index: to_size_index(chunk_size),
            slot_count,
            slabs,
            occupancy: vec![0; initial_length],
        }
    }

    /// Allocate a slot from this size class
    ///
    /// First fit over the chain, growing it by `increment` positions when
    /// every slab is full. Returns `(chain_index, slot_index)`.
    pub fn allocate(&mut self, increment: usize, bound: usize) -> Result<(usize, usize)> {
        let slot_count = self.slot_count;
        let position = match self
            .occupancy
            .iter()
            .position(|&occupied| (occupied as usize) < slot_count)
        {
            Some(position) => position,
            None => self.grow(increment, bound)?,
        };

        let slot_index = self.occupy(position)?;
        Ok((position, slot_index))
    }

    fn occupy(&mut self, position: usize) -> Result<usize> {
        let (chunk_size, slot_count) = (self.chunk_size, self.slot_count);
        let slab = self.slabs[position].get_or_insert_with(|| {
            debug!(chunk_size, position, "Materializing slab");
            Slab::new(chunk_size, slot_count)
        });

        let slot_index = slab.occupy_first_free().ok_or_else(|| {
            Error::CapacityExceeded(format!(
                "slab {} of size class {} has no free slot",
                position, chunk_size
            ))
        })?;
        self.occupancy[position] += 1;

        Ok(slot_index)
    }

    /// Extend the chain and return the first new position.
    ///
    /// Never touches the chain when the new length would exceed `bound`.
    fn grow(&mut self, increment: usize, bound: usize) -> Result<usize> {
        let old_length = self.slabs.len();
        let new_length = old_length + increment;
        if new_length > bound {
            return Err(Error::CapacityExceeded(format!(
                "chain of size class {} cannot grow beyond {} slabs",
                self.chunk_size, bound
            )));
        }

        self.slabs.resize_with(new_length, || None);
        self.occupancy.resize(new_length, 0);
        debug!(
            chunk_size = self.chunk_size,
            old_length, new_length, "Grew slab chain"
        );

        Ok(old_length)
    }

    /// Free a slot by clearing its occupancy flag
    ///
    /// A slab whose last slot is freed keeps its buffer but loses its contents.
    pub fn free(&mut self, handle: Handle, chain_index: usize, slot_index: usize) -> Result<()> {
        let slab = self
            .slabs
            .get_mut(chain_index)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle(handle))?;

        if !slab.release(slot_index) {
            return Err(Error::InvalidHandle(handle));
        }

        self.occupancy[chain_index] -= 1;
        if self.occupancy[chain_index] == 0 {
            slab.invalidate();
        }

        Ok(())
    }

    /// Current chain length, including unmaterialized positions
    pub fn chain_length(&self) -> usize {
        self.slabs.len()
    }

    /// Occupied slots at a chain position
    pub fn occupancy(&self, chain_index: usize) -> usize {
        self.occupancy.get(chain_index).copied().unwrap_or(0) as usize
    }

    pub fn slab(&self, chain_index: usize) -> Option<&Slab> {
        self.slabs.get(chain_index)?.as_ref()
    }

    pub fn slab_mut(&mut self, chain_index: usize) -> Option<&mut Slab> {
        self.slabs.get_mut(chain_index)?.as_mut()
    }

    /// Number of chain positions with a materialized slab
    pub fn materialized_slabs(&self) -> usize {
        self.slabs.iter().filter(|slab| slab.is_some()).count()
    }

    /// Get the number of occupied slots over the whole chain
    pub fn live_slots(&self) -> usize {
        self.occupancy.iter().map(|&n| n as usize).sum()
    }

    /// Get the total number of slots in materialized slabs
    pub fn total_slots(&self) -> usize {
        self.materialized_slabs() * self.slot_count
    }

    /// Get the number of free slots in materialized slabs
    pub fn free_count(&self) -> usize {
        self.total_slots() - self.live_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: usize = DEFAULT_SLAB_BUFFER_SIZE;

    #[test]
    fn test_slot_count_thresholds() {
        assert_eq!(calculate_slot_count(1, B), 127);
        assert_eq!(calculate_slot_count(30, B), 127);
        assert_eq!(calculate_slot_count(32, B), 127);
        assert_eq!(calculate_slot_count(33, B), 124);
        assert_eq!(calculate_slot_count(64, B), 64);
        assert_eq!(calculate_slot_count(455, B), 9);
        assert_eq!(calculate_slot_count(456, B), 8);
        assert_eq!(calculate_slot_count(513, B), 7);
        assert_eq!(calculate_slot_count(586, B), 6);
        assert_eq!(calculate_slot_count(683, B), 5);
        assert_eq!(calculate_slot_count(820, B), 4);
        assert_eq!(calculate_slot_count(1024, B), 4);
    }

    #[test]
    fn test_slot_count_is_monotonic() {
        let mut previous = usize::MAX;
        for chunk_size in MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE {
            let slots = calculate_slot_count(chunk_size, B);
            assert!(slots >= MIN_SLOT_COUNT && slots <= MAX_SLOT_COUNT);
            assert!(slots <= previous, "not monotonic at {}", chunk_size);
            // never wildly beyond the target buffer size
            assert!(slots * chunk_size <= B + MAX_CHUNK_SIZE);
            previous = slots;
        }
    }

    #[test]
    fn test_size_index_conversion() {
        assert_eq!(to_size_index(1), 0);
        assert_eq!(to_size_index(1024), 1023);
        assert_eq!(to_chunk_size(1023), 1024);
    }

    #[test]
    fn test_size_class_allocation() {
        let mut sc = SizeClass::new(64, 4, 8);

        assert_eq!(sc.allocate(8, 64).unwrap(), (0, 0));
        assert_eq!(sc.allocate(8, 64).unwrap(), (0, 1));
        assert_eq!(sc.chain_length(), 8);
        assert_eq!(sc.materialized_slabs(), 1);
        assert_eq!(sc.live_slots(), 2);
        assert_eq!(sc.free_count(), 2);
    }

    #[test]
    fn test_size_class_reuse() {
        let mut sc = SizeClass::new(64, 4, 8);

        let (chain, slot) = sc.allocate(8, 64).unwrap();
        sc.allocate(8, 64).unwrap();

        sc.free(1, chain, slot).unwrap();
        assert_eq!(sc.occupancy(0), 1);

        // Freed slot is handed out again
        assert_eq!(sc.allocate(8, 64).unwrap(), (0, 0));
        assert_eq!(sc.allocate(8, 64).unwrap(), (0, 2));
    }

    #[test]
    fn test_double_free_rejected() {
        let mut sc = SizeClass::new(16, 4, 8);
        let (chain, slot) = sc.allocate(8, 64).unwrap();

        sc.free(7, chain, slot).unwrap();
        assert_eq!(sc.free(7, chain, slot), Err(Error::InvalidHandle(7)));
        // never materialized
        assert_eq!(sc.free(7, 3, 0), Err(Error::InvalidHandle(7)));
        // beyond the chain
        assert_eq!(sc.free(7, 100, 0), Err(Error::InvalidHandle(7)));
    }

    #[test]
    fn test_chain_growth() {
        let mut sc = SizeClass::new(1024, 4, 8);

        for _ in 0..32 {
            sc.allocate(8, 64).unwrap();
        }
        assert_eq!(sc.chain_length(), 8);

        assert_eq!(sc.allocate(8, 64).unwrap(), (8, 0));
        assert_eq!(sc.chain_length(), 16);
    }

    #[test]
    fn test_growth_bound() {
        let mut sc = SizeClass::new(1024, 4, 8);

        for _ in 0..64 {
            sc.allocate(8, 16).unwrap();
        }
        assert_eq!(sc.chain_length(), 16);

        let result = sc.allocate(8, 16);
        assert!(matches!(result, Err(Error::CapacityExceeded(_))));
        assert_eq!(sc.chain_length(), 16);
        assert_eq!(sc.live_slots(), 64);
    }

    #[test]
    fn test_last_free_invalidates_contents() {
        let mut sc = SizeClass::new(8, 4, 8);
        let (chain, slot) = sc.allocate(8, 64).unwrap();

        sc.slab_mut(chain).unwrap().bytes_mut()[0] = 0xFF;
        sc.free(1, chain, slot).unwrap();

        let slab = sc.slab(chain).expect("Slab buffer should be kept");
        assert_eq!(slab.bytes()[0], 0);
        assert_eq!(sc.occupancy(chain), 0);
    }
}
