//! Slab pool: the small allocation path

use super::address::{self, Handle, SmallAddress};
use super::size_class::{
    calculate_slot_count, to_chunk_size, to_size_index, SizeClass, MAX_CHUNK_SIZE,
    MIN_CHUNK_SIZE,
};
use super::slab::Slab;
use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::{debug, info};

/// Slab pool for allocations of 1 to 1024 bytes
///
/// One size class per byte count, each with its own chain of slabs.
/// Handles are packed by [`address::pack_small`] and stay valid across
/// chain growth since slabs never move.
pub struct SlabPool {
    /// Size classes indexed by `chunk_size - 1`, created on first use
    size_classes: Vec<Option<SizeClass>>,
    /// Slots per slab, indexed like `size_classes`
    slot_counts: Vec<usize>,
    chain_increment: usize,
    max_chain_length: usize,
}

impl SlabPool {
    /// Create an empty pool
    pub fn new(config: &MemoryConfig) -> Self {
        let slot_counts = (MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE)
            .map(|size| calculate_slot_count(size, config.slab_buffer_size))
            .collect();

        let mut size_classes = Vec::with_capacity(MAX_CHUNK_SIZE);
        size_classes.resize_with(MAX_CHUNK_SIZE, || None);

        Self {
            size_classes,
            slot_counts,
            chain_increment: config.chain_increment,
            max_chain_length: config.max_chain_length,
        }
    }

    /// Allocate one chunk of exactly `chunk_size` bytes
    pub fn allocate(&mut self, chunk_size: usize) -> Result<Handle> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(Error::SizeOutOfRange(chunk_size as i64));
        }

        let index = to_size_index(chunk_size);
        let slot_count = self.slot_counts[index as usize];
        let (increment, bound) = (self.chain_increment, self.max_chain_length);

        let size_class = self.size_classes[index as usize].get_or_insert_with(|| {
            info!(chunk_size, slot_count, "Initializing size class chain");
            SizeClass::new(chunk_size, slot_count, increment)
        });

        let length_before = size_class.chain_length();
        let (chain_index, slot_index) = size_class.allocate(increment, bound)?;
        if size_class.chain_length() != length_before {
            metrics::counter!("photonmem_chain_growths_total").increment(1);
            info!(
                chunk_size,
                chain_length = size_class.chain_length(),
                "Slab chain grown"
            );
        }

        let handle = address::pack_small(index, chain_index as u32, slot_index as u32);
        debug!(chunk_size, chain_index, slot_index, handle, "Allocated small chunk");

        Ok(handle)
    }

    /// Free a previously allocated chunk by its base handle
    pub fn free(&mut self, handle: Handle, small: SmallAddress) -> Result<()> {
        if small.slot_offset() != 0 {
            return Err(Error::NotBaseAddress {
                handle,
                offset: small.slot_offset() as u32,
            });
        }

        let slot_index = small.slot_index();
        let size_class = self
            .size_classes
            .get_mut(small.size_index as usize)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle(handle))?;

        if slot_index >= size_class.slot_count {
            return Err(Error::InvalidHandle(handle));
        }
        size_class.free(handle, small.chain_index as usize, slot_index)?;

        debug!(
            chunk_size = small.chunk_size(),
            chain_index = small.chain_index,
            slot_index,
            "Freed small chunk"
        );
        Ok(())
    }

    fn live_slab(&self, handle: Handle, small: &SmallAddress) -> Result<&Slab> {
        let slab = self
            .size_classes
            .get(small.size_index as usize)
            .and_then(Option::as_ref)
            .and_then(|sc| sc.slab(small.chain_index as usize))
            .ok_or(Error::InvalidHandle(handle))?;

        if !slab.is_occupied(small.slot_index()) {
            return Err(Error::InvalidHandle(handle));
        }
        Ok(slab)
    }

    /// Size of the live chunk starting at `handle`
    pub fn size_of(&self, handle: Handle, small: &SmallAddress) -> Result<usize> {
        if small.slot_offset() != 0 {
            return Err(Error::NotBaseAddress {
                handle,
                offset: small.slot_offset() as u32,
            });
        }
        self.live_slab(handle, small)?;
        Ok(small.chunk_size())
    }

    /// Byte range `[position, position + length)` of a live chunk.
    ///
    /// The range may not leave the chunk the handle points into.
    fn chunk_range(handle: Handle, small: &SmallAddress, length: usize) -> Result<(usize, usize)> {
        let start = small.position as usize;
        if small.slot_offset() + length > small.chunk_size() {
            return Err(Error::OutOfBounds { handle, length });
        }
        Ok((start, start + length))
    }

    /// Read access to `length` bytes at `handle`
    pub fn bytes(&self, handle: Handle, small: &SmallAddress, length: usize) -> Result<&[u8]> {
        let (start, end) = Self::chunk_range(handle, small, length)?;
        let slab = self.live_slab(handle, small)?;
        Ok(&slab.bytes()[start..end])
    }

    /// Write access to `length` bytes at `handle`
    pub fn bytes_mut(
        &mut self,
        handle: Handle,
        small: &SmallAddress,
        length: usize,
    ) -> Result<&mut [u8]> {
        let (start, end) = Self::chunk_range(handle, small, length)?;
        self.live_slab(handle, small)?;

        let slab = self
            .size_classes
            .get_mut(small.size_index as usize)
            .and_then(Option::as_mut)
            .and_then(|sc| sc.slab_mut(small.chain_index as usize))
            .ok_or(Error::InvalidHandle(handle))?;
        Ok(&mut slab.bytes_mut()[start..end])
    }

    /// Slots per slab for a chunk size
    pub fn slot_count(&self, chunk_size: usize) -> Option<usize> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return None;
        }
        Some(self.slot_counts[chunk_size - 1])
    }

    /// Get a size class if it has been initialized
    pub fn size_class(&self, chunk_size: usize) -> Option<&SizeClass> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return None;
        }
        self.size_classes[chunk_size - 1].as_ref()
    }

    /// Get statistics about the initialized size classes
    pub fn stats(&self) -> Vec<SizeClassStats> {
        self.size_classes
            .iter()
            .flatten()
            .map(|sc| SizeClassStats {
                chunk_size: to_chunk_size(sc.index),
                slot_count: sc.slot_count,
                chain_length: sc.chain_length(),
                materialized_slabs: sc.materialized_slabs(),
                live_slots: sc.live_slots(),
                free_slots: sc.free_count(),
            })
            .collect()
    }
}

/// Statistics for one size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeClassStats {
    pub chunk_size: usize,
    pub slot_count: usize,
    pub chain_length: usize,
    pub materialized_slabs: usize,
    pub live_slots: usize,
    pub free_slots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::address::{decode, Address};

    fn small(handle: Handle) -> SmallAddress {
        match decode(handle).unwrap() {
            Address::Small(small) => small,
            other => panic!("Expected small address, got {}", other),
        }
    }

    #[test]
    fn test_pool_first_allocation() -> Result<()> {
        let mut pool = SlabPool::new(&MemoryConfig::default());

        let handle = pool.allocate(30)?;
        let a = small(handle);
        assert_eq!(a.chunk_size(), 30);
        assert_eq!(a.chain_index, 0);
        assert_eq!(a.slot_index(), 0);

        let sc = pool.size_class(30).unwrap();
        assert_eq!(sc.chain_length(), 8);
        assert_eq!(sc.occupancy(0), 1);
        Ok(())
    }

    #[test]
    fn test_pool_free_and_reuse() -> Result<()> {
        let mut pool = SlabPool::new(&MemoryConfig::default());

        let first = pool.allocate(100)?;
        let second = pool.allocate(100)?;
        assert_ne!(first, second);

        pool.free(first, small(first))?;
        assert_eq!(pool.allocate(100)?, first);
        Ok(())
    }

    #[test]
    fn test_pool_rejects_inner_address() -> Result<()> {
        let mut pool = SlabPool::new(&MemoryConfig::default());
        let handle = pool.allocate(16)?;

        let inner = handle + 1;
        assert_eq!(
            pool.free(inner, small(inner)),
            Err(Error::NotBaseAddress {
                handle: inner,
                offset: 1
            })
        );
        Ok(())
    }

    #[test]
    fn test_pool_rejects_unknown_size_class() {
        let mut pool = SlabPool::new(&MemoryConfig::default());
        let forged = address::pack_small(99, 0, 0);
        assert_eq!(
            pool.free(forged, small(forged)),
            Err(Error::InvalidHandle(forged))
        );
    }

    #[test]
    fn test_pool_bounds() -> Result<()> {
        let mut pool = SlabPool::new(&MemoryConfig::default());
        let handle = pool.allocate(8)?;

        assert_eq!(pool.bytes(handle, &small(handle), 8)?.len(), 8);
        assert!(pool.bytes(handle + 4, &small(handle + 4), 4).is_ok());
        assert_eq!(
            pool.bytes(handle + 4, &small(handle + 4), 5),
            Err(Error::OutOfBounds {
                handle: handle + 4,
                length: 5
            })
        );

        pool.bytes_mut(handle, &small(handle), 1)?[0] = 9;
        assert_eq!(pool.bytes(handle, &small(handle), 1)?[0], 9);

        // Neighbouring slot has never been handed out
        let neighbour = handle + 8;
        assert_eq!(
            pool.bytes(neighbour, &small(neighbour), 1),
            Err(Error::InvalidHandle(neighbour))
        );
        Ok(())
    }

    #[test]
    fn test_pool_stats() -> Result<()> {
        let mut pool = SlabPool::new(&MemoryConfig::default());
        pool.allocate(50)?;
        pool.allocate(50)?;
        pool.allocate(1024)?;

        let stats = pool.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].chunk_size, 50);
        assert_eq!(stats[0].live_slots, 2);
        assert_eq!(stats[1].chunk_size, 1024);
        assert_eq!(stats[1].slot_count, 4);
        assert_eq!(stats[1].free_slots, 3);
        Ok(())
    }
}
