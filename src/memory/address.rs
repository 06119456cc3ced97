//! Address packing
//!
//! A handle is a positive `i64` that behaves like a raw address: callers may
//! add an offset to it and access the memory there. The upper 4 bytes carry
//! the identity of the backing buffer, the lower 4 bytes the byte position
//! inside that buffer.
//!
//! ```text
//!  63  62  61         52 51                  32 31                          0
//! +---+---+-------------+----------------------+-----------------------------+
//! | 0 | 1 | size index  |     chain index      |  byte position within slab  |  small
//! +---+---+-------------+----------------------+-----------------------------+
//! | 0 | 0 |      big table identifier          |  byte offset within buffer  |  big
//! +---+---+------------------------------------+-----------------------------+
//! ```
//!
//! The sign bit is never used since it would ruin address arithmetic.

use crate::error::{Error, Result};
use std::fmt;

/// Pointer-like handle to emulated memory. `0` is null.
pub type Handle = i64;

/// The null handle.
pub const NULL: Handle = 0;

pub const LOWEST_VALID_HANDLE: Handle = 1;

pub const SIZE_INDEX_BITS: u32 = 10;
pub const CHAIN_INDEX_BITS: u32 = 20;

const IDENTIFIER_SHIFT: u32 = 32;
const SIZE_INDEX_SHIFT: u32 = CHAIN_INDEX_BITS;
const CHAIN_INDEX_MASK: u32 = (1 << CHAIN_INDEX_BITS) - 1;

/// Category flag: set for slab ("small") handles, clear for big handles.
pub const SMALL_FLAG: i64 = 1 << (IDENTIFIER_SHIFT + SIZE_INDEX_BITS + CHAIN_INDEX_BITS);

/// Number of distinct chain indices the identifier can express.
pub const MAX_CHAIN_LENGTH: usize = 1 << CHAIN_INDEX_BITS;

/// One growth increment kept free below the chain index limit.
pub const CHAIN_HEADROOM: usize = 8;

/// Largest chain length a size class may ever reach.
pub const CHAIN_LENGTH_BOUND: usize = MAX_CHAIN_LENGTH - CHAIN_HEADROOM;

/// Big identifiers must stay clear of the category flag and the sign bit.
pub const MAX_BIG_IDENTIFIER: u32 = (1 << 30) - 1;

/// Category of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Small,
    Big,
}

fn pack_small_identifier(size_index: u16, chain_index: u32) -> u32 {
    ((size_index as u32) << SIZE_INDEX_SHIFT) | chain_index
}

/// Pack a slab slot into a handle.
///
/// The caller guarantees `size_index < 1024`, `chain_index < CHAIN_LENGTH_BOUND`
/// and a slot index inside the slab.
pub fn pack_small(size_index: u16, chain_index: u32, slot_index: u32) -> Handle {
    let identifier = pack_small_identifier(size_index, chain_index);
    let position = slot_index * (size_index as u32 + 1);

    SMALL_FLAG | (((identifier as i64) << IDENTIFIER_SHIFT) + position as i64)
}

/// Pack a big table identifier and an offset into a handle.
pub fn pack_big(identifier: u32, offset: u32) -> Handle {
    ((identifier as i64) << IDENTIFIER_SHIFT) + offset as i64
}

pub fn kind_of(handle: Handle) -> AddressKind {
    if (handle & SMALL_FLAG) != 0 {
        AddressKind::Small
    } else {
        AddressKind::Big
    }
}

/// Returns `(size_index, chain_index)` of a small handle.
pub fn unpack_small(handle: Handle) -> (u16, u32) {
    let identifier = ((handle ^ SMALL_FLAG) >> IDENTIFIER_SHIFT) as u32;
    (
        (identifier >> SIZE_INDEX_SHIFT) as u16,
        identifier & CHAIN_INDEX_MASK,
    )
}

pub fn unpack_big(handle: Handle) -> u32 {
    (handle >> IDENTIFIER_SHIFT) as u32
}

/// Lower 4 bytes: the byte position within the backing buffer.
pub fn unpack_offset(handle: Handle) -> u32 {
    handle as u32
}

/// Reject the null handle and every other non-positive value.
pub fn validate(handle: Handle) -> Result<()> {
    if handle < LOWEST_VALID_HANDLE {
        if handle == NULL {
            return Err(Error::NullHandle);
        }
        return Err(Error::InvalidHandle(handle));
    }
    Ok(())
}

/// A decoded slab handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SmallAddress {
    pub size_index: u16,
    pub chain_index: u32,
    /// Byte position within the slab
    pub position: u32,
}

impl SmallAddress {
    pub fn chunk_size(&self) -> usize {
        self.size_index as usize + 1
    }

    pub fn slot_index(&self) -> usize {
        self.position as usize / self.chunk_size()
    }

    /// Offset relative to the start of the slot
    pub fn slot_offset(&self) -> usize {
        self.position as usize % self.chunk_size()
    }
}

/// A decoded big table handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BigAddress {
    pub identifier: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Small(SmallAddress),
    Big(BigAddress),
}

/// Validate and split a handle into its parts.
pub fn decode(handle: Handle) -> Result<Address> {
    validate(handle)?;

    Ok(match kind_of(handle) {
        AddressKind::Small => {
            let (size_index, chain_index) = unpack_small(handle);
            Address::Small(SmallAddress {
                size_index,
                chain_index,
                position: unpack_offset(handle),
            })
        }
        AddressKind::Big => Address::Big(BigAddress {
            identifier: unpack_big(handle),
            offset: unpack_offset(handle),
        }),
    })
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Small(a) => write!(
                f,
                "Small(size={}, chain={}, slot={}, offset={})",
                a.chunk_size(),
                a.chain_index,
                a.slot_index(),
                a.slot_offset()
            ),
            Address::Big(a) => write!(f, "Big(id={}, offset={})", a.identifier, a.offset),
        }
    }
}
