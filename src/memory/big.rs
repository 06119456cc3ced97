//! Big allocation table
//!
//! Requests above the largest size class get a dedicated zeroed buffer each.
//! Table slots are recycled through a free list so the table only grows when
//! every slot is live.

use super::address::{self, BigAddress, Handle, MAX_BIG_IDENTIFIER};
use crate::error::{Error, Result};
use bytes::BytesMut;
use tracing::debug;

/// Table of independently sized buffers
#[derive(Debug, Default)]
pub struct BigTable {
    buffers: Vec<Option<BytesMut>>,
    /// Indices of released table slots, most recent last
    free_indices: Vec<usize>,
}

// Identifier 0 would pack into the null handle.
fn to_identifier(index: usize) -> u32 {
    index as u32 + 1
}

fn to_index(identifier: u32) -> Option<usize> {
    (identifier as usize).checked_sub(1)
}

impl BigTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a buffer of exactly `size` bytes
    pub fn allocate(&mut self, size: usize) -> Result<Handle> {
        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                if self.buffers.len() >= MAX_BIG_IDENTIFIER as usize {
                    return Err(Error::CapacityExceeded(format!(
                        "big allocation table is limited to {} entries",
                        MAX_BIG_IDENTIFIER
                    )));
                }
                self.buffers.push(None);
                self.buffers.len() - 1
            }
        };

        self.buffers[index] = Some(BytesMut::zeroed(size));
        debug!(size, index, "Allocated big chunk");

        Ok(address::pack_big(to_identifier(index), 0))
    }

    /// Release the buffer behind a base handle
    pub fn free(&mut self, handle: Handle, big: BigAddress) -> Result<()> {
        if big.offset != 0 {
            return Err(Error::NotBaseAddress {
                handle,
                offset: big.offset,
            });
        }

        let index = to_index(big.identifier).ok_or(Error::InvalidHandle(handle))?;
        match self.buffers.get_mut(index) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.free_indices.push(index);
                debug!(index, "Freed big chunk");
                Ok(())
            }
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    fn buffer(&self, handle: Handle, big: &BigAddress) -> Result<&BytesMut> {
        to_index(big.identifier)
            .and_then(|index| self.buffers.get(index))
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidHandle(handle))
    }

    fn range(
        handle: Handle,
        big: &BigAddress,
        capacity: usize,
        length: usize,
    ) -> Result<(usize, usize)> {
        let start = big.offset as usize;
        match start.checked_add(length) {
            Some(end) if end <= capacity => Ok((start, end)),
            _ => Err(Error::OutOfBounds { handle, length }),
        }
    }

    /// Read access to `length` bytes at `handle`
    pub fn bytes(&self, handle: Handle, big: &BigAddress, length: usize) -> Result<&[u8]> {
        let buffer = self.buffer(handle, big)?;
        let (start, end) = Self::range(handle, big, buffer.len(), length)?;
        Ok(&buffer[start..end])
    }

    /// Write access to `length` bytes at `handle`
    pub fn bytes_mut(
        &mut self,
        handle: Handle,
        big: &BigAddress,
        length: usize,
    ) -> Result<&mut [u8]> {
        let capacity = self.buffer(handle, big)?.len();
        let (start, end) = Self::range(handle, big, capacity, length)?;

        let buffer = to_index(big.identifier)
            .and_then(|index| self.buffers.get_mut(index))
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle(handle))?;
        Ok(&mut buffer[start..end])
    }

    /// Size of the buffer behind a live handle
    pub fn size_of(&self, handle: Handle, big: &BigAddress) -> Result<usize> {
        Ok(self.buffer(handle, big)?.len())
    }

    /// Number of table slots, live or free
    pub fn table_len(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_count(&self) -> usize {
        self.buffers.len() - self.free_indices.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.buffers.iter().flatten().map(BytesMut::len).sum()
    }
}
