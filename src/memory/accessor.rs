//! Memory accessor: the public allocation and access API
//!
//! Mirrors a raw memory API so that higher layers can treat handles like
//! pointers. Every call runs under one mutex per heap; there is no
//! lock-free fast path.

use super::address::{self, Address, Handle, NULL};
use super::big::BigTable;
use super::pool::{SizeClassStats, SlabPool};
use super::primitive::{read_slice, write_slice, ByteOrder, Primitive};
use super::size_class::MAX_CHUNK_SIZE;
use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::object::{
    AttributeList, AttributeRef, AttributeRegistry, AttributeValue, ClassCatalog,
    ClassIntrospector, Object, ObjectRef,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Largest allocation the handle layout can address
const MAX_ALLOCATION_SIZE: i64 = i32::MAX as i64;

/// Allocation state behind the accessor lock
struct Heap {
    small: SlabPool,
    big: BigTable,
}

impl Heap {
    fn allocate(&mut self, bytes: i64) -> Result<Handle> {
        // consistent with native allocators: zero bytes yield null
        if bytes == 0 {
            return Ok(NULL);
        }
        if !(1..=MAX_ALLOCATION_SIZE).contains(&bytes) {
            return Err(Error::SizeOutOfRange(bytes));
        }

        let size = bytes as usize;
        if size <= MAX_CHUNK_SIZE {
            let handle = self.small.allocate(size)?;
            metrics::counter!("photonmem_allocations_total", "category" => "small").increment(1);
            Ok(handle)
        } else {
            let handle = self.big.allocate(size)?;
            metrics::counter!("photonmem_allocations_total", "category" => "big").increment(1);
            Ok(handle)
        }
    }

    fn free(&mut self, handle: Handle) -> Result<()> {
        // consistent with native free: null is ignored
        if handle == NULL {
            return Ok(());
        }

        match address::decode(handle)? {
            Address::Small(small) => self.small.free(handle, small)?,
            Address::Big(big) => self.big.free(handle, big)?,
        }
        metrics::counter!("photonmem_frees_total").increment(1);
        Ok(())
    }

    fn size_of(&self, handle: Handle) -> Result<usize> {
        match address::decode(handle)? {
            Address::Small(small) => self.small.size_of(handle, &small),
            Address::Big(big) => {
                if big.offset != 0 {
                    return Err(Error::NotBaseAddress {
                        handle,
                        offset: big.offset,
                    });
                }
                self.big.size_of(handle, &big)
            }
        }
    }

    fn bytes(&self, handle: Handle, length: usize) -> Result<&[u8]> {
        match address::decode(handle)? {
            Address::Small(small) => self.small.bytes(handle, &small, length),
            Address::Big(big) => self.big.bytes(handle, &big, length),
        }
    }

    fn bytes_mut(&mut self, handle: Handle, length: usize) -> Result<&mut [u8]> {
        match address::decode(handle)? {
            Address::Small(small) => self.small.bytes_mut(handle, &small, length),
            Address::Big(big) => self.big.bytes_mut(handle, &big, length),
        }
    }
}

fn to_length(length: i64) -> Result<usize> {
    usize::try_from(length).map_err(|_| Error::SizeOutOfRange(length))
}

/// Snapshot of allocator usage
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub size_classes: Vec<SizeClassStats>,
    pub small_live_chunks: usize,
    pub small_live_bytes: usize,
    pub big_live_allocations: usize,
    pub big_live_bytes: usize,
    pub big_table_len: usize,
}

macro_rules! address_accessors {
    ($($get:ident, $set:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Read a `", stringify!($ty), "` at `handle`")]
            pub fn $get(&self, handle: Handle) -> Result<$ty> {
                self.get::<$ty>(handle)
            }

            #[doc = concat!("Write a `", stringify!($ty), "` at `handle`")]
            pub fn $set(&self, handle: Handle, value: $ty) -> Result<()> {
                self.set::<$ty>(handle, value)
            }
        )*
    };
}

macro_rules! object_accessors {
    ($($get:ident, $set:ident, $ty:ty;)*) => {
        $(
            pub fn $get(&self, object: &Object, offset: i64) -> Result<$ty> {
                self.get_attribute::<$ty>(object, offset)
            }

            pub fn $set(&self, object: &Object, offset: i64, value: $ty) -> Result<()> {
                self.set_attribute::<$ty>(object, offset, value)
            }
        )*
    };
}

/// Emulated memory with pointer-like handles
///
/// Cloning yields another accessor on the same heap and registry.
#[derive(Clone)]
pub struct MemoryAccessor {
    heap: Arc<Mutex<Heap>>,
    registry: Arc<AttributeRegistry>,
    byte_order: ByteOrder,
}

impl MemoryAccessor {
    /// Create an accessor with its own heap and attribute registry
    pub fn new(config: &MemoryConfig, introspector: Arc<dyn ClassIntrospector>) -> Result<Self> {
        Self::with_registry(config, Arc::new(AttributeRegistry::new(introspector)))
    }

    /// Create an accessor with its own heap and a shared registry
    pub fn with_registry(config: &MemoryConfig, registry: Arc<AttributeRegistry>) -> Result<Self> {
        config.validate()?;
        info!(
            slab_buffer_size = config.slab_buffer_size,
            chain_increment = config.chain_increment,
            max_chain_length = config.max_chain_length,
            byte_order = ?config.byte_order,
            "Initializing memory accessor"
        );

        Ok(Self {
            heap: Arc::new(Mutex::new(Heap {
                small: SlabPool::new(config),
                big: BigTable::new(),
            })),
            registry,
            byte_order: config.byte_order,
        })
    }

    /// Accessor on the same heap whose typed access uses the opposite byte order
    pub fn to_reversing(&self) -> MemoryAccessor {
        Self {
            heap: Arc::clone(&self.heap),
            registry: Arc::clone(&self.registry),
            byte_order: self.byte_order.reversed(),
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn registry(&self) -> &Arc<AttributeRegistry> {
        &self.registry
    }

    // memory allocation //

    /// Allocate `bytes` bytes of zeroed memory. `0` yields the null handle.
    pub fn allocate(&self, bytes: i64) -> Result<Handle> {
        self.heap.lock().allocate(bytes)
    }

    /// Move an allocation to a block of `bytes` bytes
    ///
    /// The overlapping prefix of the old contents is preserved. The new
    /// block is allocated before the old one is released, so a failed call
    /// leaves the old allocation intact.
    pub fn reallocate(&self, handle: Handle, bytes: i64) -> Result<Handle> {
        let mut heap = self.heap.lock();
        if handle == NULL {
            return heap.allocate(bytes);
        }

        let old_size = heap.size_of(handle)?;
        let new_handle = heap.allocate(bytes)?;
        if new_handle != NULL {
            let keep = old_size.min(bytes as usize);
            let prefix = heap.bytes(handle, keep)?.to_vec();
            heap.bytes_mut(new_handle, keep)?.copy_from_slice(&prefix);
        }
        heap.free(handle)?;

        debug!(handle, new_handle, bytes, "Reallocated");
        Ok(new_handle)
    }

    /// Release an allocation. The null handle is ignored.
    pub fn free(&self, handle: Handle) -> Result<()> {
        let result = self.heap.lock().free(handle);
        if let Err(e) = &result {
            warn!(handle, error = %e, "Rejected free");
        }
        result
    }

    /// Size of the allocation starting at `handle`
    pub fn allocation_size(&self, handle: Handle) -> Result<usize> {
        self.heap.lock().size_of(handle)
    }

    /// Set `length` bytes at `handle` to `value`
    pub fn fill(&self, handle: Handle, length: i64, value: i8) -> Result<()> {
        let length = to_length(length)?;
        self.heap.lock().bytes_mut(handle, length)?.fill(value as u8);
        Ok(())
    }

    // address-based primitive access //

    /// Read a primitive at `handle`
    pub fn get<T: Primitive>(&self, handle: Handle) -> Result<T> {
        let heap = self.heap.lock();
        Ok(T::read(heap.bytes(handle, T::WIDTH)?, self.byte_order))
    }

    /// Write a primitive at `handle`
    pub fn set<T: Primitive>(&self, handle: Handle, value: T) -> Result<()> {
        let mut heap = self.heap.lock();
        value.write(heap.bytes_mut(handle, T::WIDTH)?, self.byte_order);
        Ok(())
    }

    address_accessors! {
        get_byte, set_byte, i8;
        get_bool, set_bool, bool;
        get_short, set_short, i16;
        get_char, set_char, u16;
        get_int, set_int, i32;
        get_float, set_float, f32;
        get_long, set_long, i64;
        get_double, set_double, f64;
    }

    // object-based access //

    /// Read the attribute at `offset` of `object`
    pub fn get_attribute<T: AttributeValue>(&self, object: &Object, offset: i64) -> Result<T> {
        let _heap = self.heap.lock();
        object.get_as::<T>(offset)
    }

    /// Write the attribute at `offset` of `object`
    pub fn set_attribute<T: AttributeValue>(
        &self,
        object: &Object,
        offset: i64,
        value: T,
    ) -> Result<()> {
        let _heap = self.heap.lock();
        object.set(offset, value.into_value())
    }

    object_accessors! {
        get_byte_of, set_byte_of, i8;
        get_bool_of, set_bool_of, bool;
        get_short_of, set_short_of, i16;
        get_char_of, set_char_of, u16;
        get_int_of, set_int_of, i32;
        get_float_of, set_float_of, f32;
        get_long_of, set_long_of, i64;
        get_double_of, set_double_of, f64;
        get_object_of, set_object_of, Option<ObjectRef>;
    }

    // range copying //

    /// Copy `length` bytes from `source` to `target`. Overlapping ranges are fine.
    pub fn copy(&self, source: Handle, target: Handle, length: i64) -> Result<()> {
        let length = to_length(length)?;
        let mut heap = self.heap.lock();

        let data = heap.bytes(source, length)?.to_vec();
        heap.bytes_mut(target, length)?.copy_from_slice(&data);
        Ok(())
    }

    /// Fill `target` with consecutive values starting at `handle`
    pub fn copy_to_array<T: Primitive>(&self, handle: Handle, target: &mut [T]) -> Result<()> {
        let heap = self.heap.lock();
        let bytes = heap.bytes(handle, target.len() * T::WIDTH)?;
        read_slice(bytes, target, self.byte_order);
        Ok(())
    }

    /// Store `source` as consecutive values starting at `handle`
    pub fn copy_from_array<T: Primitive>(&self, source: &[T], handle: Handle) -> Result<()> {
        let mut heap = self.heap.lock();
        let bytes = heap.bytes_mut(handle, source.len() * T::WIDTH)?;
        write_slice(source, bytes, self.byte_order);
        Ok(())
    }

    /// Encode a primitive into a caller-owned byte buffer at `index`
    pub fn put_in_bytes<T: Primitive>(&self, bytes: &mut [u8], index: usize, value: T) -> Result<()> {
        let length = bytes.len();
        let target = index
            .checked_add(T::WIDTH)
            .and_then(|end| bytes.get_mut(index..end))
            .ok_or(Error::IndexOutOfBounds { index, length })?;
        value.write(target, self.byte_order);
        Ok(())
    }

    // attribute offsets //

    /// Offset of `attribute` in the layout of `class`
    pub fn attribute_offset(&self, class: &str, attribute: &AttributeRef) -> Result<i64> {
        self.registry.attribute_offset(class, attribute)
    }

    /// Offsets of `attributes` in the layout of `class`
    pub fn attribute_offsets(&self, class: &str, attributes: &[AttributeRef]) -> Result<Vec<i64>> {
        self.registry.attribute_offsets(class, attributes)
    }

    /// Offsets of `attributes` in the layout of their most specific declaring type
    pub fn attribute_offsets_of(&self, attributes: &[AttributeRef]) -> Result<Vec<i64>> {
        self.registry.attribute_offsets_of(attributes)
    }

    /// Register the attribute layout of `class` ahead of first use
    pub fn ensure_class_initialized(&self, class: &str) -> Result<AttributeList> {
        self.registry.ensure_registered(class)
    }

    /// Create an object of `class` with default attribute values
    pub fn instantiate_blank(&self, class: &str) -> Result<ObjectRef> {
        self.registry.instantiate(class)
    }

    // diagnostics //

    pub fn stats(&self) -> MemoryStats {
        let heap = self.heap.lock();
        let size_classes = heap.small.stats();

        MemoryStats {
            small_live_chunks: size_classes.iter().map(|sc| sc.live_slots).sum(),
            small_live_bytes: size_classes
                .iter()
                .map(|sc| sc.live_slots * sc.chunk_size)
                .sum(),
            big_live_allocations: heap.big.live_count(),
            big_live_bytes: heap.big.live_bytes(),
            big_table_len: heap.big.table_len(),
            size_classes,
        }
    }

    /// Chain length of a size class, `None` before its first allocation
    pub fn chain_length(&self, chunk_size: usize) -> Option<usize> {
        let heap = self.heap.lock();
        heap.small.size_class(chunk_size).map(|sc| sc.chain_length())
    }

    /// Occupied slots of one slab, `None` before the size class exists
    pub fn slab_occupancy(&self, chunk_size: usize, chain_index: usize) -> Option<usize> {
        let heap = self.heap.lock();
        heap.small
            .size_class(chunk_size)
            .map(|sc| sc.occupancy(chain_index))
    }

    /// Slots per slab for a chunk size
    pub fn slot_count(&self, chunk_size: usize) -> Option<usize> {
        self.heap.lock().small.slot_count(chunk_size)
    }
}

impl Default for MemoryAccessor {
    /// Default configuration and an empty class catalog
    fn default() -> Self {
        let config = MemoryConfig::default();
        Self {
            heap: Arc::new(Mutex::new(Heap {
                small: SlabPool::new(&config),
                big: BigTable::new(),
            })),
            registry: Arc::new(AttributeRegistry::new(Arc::new(ClassCatalog::new()))),
            byte_order: config.byte_order,
        }
    }
}
