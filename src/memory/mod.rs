//! Emulated memory
//!
//! Hands out 64-bit handles that behave like raw pointers but are backed
//! by pooled byte buffers.
//!
//! # Architecture
//!
//! ```text
//! MemoryAccessor (one lock per heap)
//!   ├─→ SlabPool (1..=1024 bytes)
//!   │     ├─→ SizeClass(30B)  → chain: [slab, slab, -, -, -, -, -, -]
//!   │     ├─→ SizeClass(64B)  → chain: [slab, -, -, -, -, -, -, -]
//!   │     └─→ SizeClass(1024B)→ chain: [slab, slab, slab, -, ...]
//!   └─→ BigTable (> 1024 bytes)
//!         └─→ [buf#1, -, buf#3, ...]  free: [1]
//!
//! Handle (i64)
//!   small: 0 | 1 | size_index(10) | chain_index(20) | position(32)
//!   big:   0 | 0 | identifier(30)                   | offset(32)
//! ```
//!
//! Slabs are created lazily and never move, so handles stay valid until
//! they are freed.

pub mod accessor;
pub mod address;
pub mod big;
pub mod pool;
pub mod primitive;
pub mod size_class;
pub mod slab;

pub use accessor::{MemoryAccessor, MemoryStats};
pub use address::{Address, Handle, NULL};
pub use big::BigTable;
pub use pool::{SizeClassStats, SlabPool};
pub use primitive::{ByteOrder, Primitive};
pub use size_class::SizeClass;
pub use slab::Slab;
