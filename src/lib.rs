// PhotonDB Memory - Rust Implementation
// Emulated address space on top of pooled managed buffers

#![warn(rust_2018_idioms)]

pub mod config;
pub mod memory;
pub mod object;

// Re-exports for convenience
pub use crate::config::MemoryConfig;
pub use crate::memory::{Handle, MemoryAccessor};
pub use crate::object::{AttributeRegistry, ClassCatalog, Object, ObjectRef};

/// Memory error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        #[error("Null handle")]
        NullHandle,

        #[error("Invalid handle: {0}")]
        InvalidHandle(i64),

        #[error("Not the base address of an allocated memory range: {handle} (offset = {offset})")]
        NotBaseAddress { handle: i64, offset: u32 },

        #[error("Memory allocation capacity exceeded: {0}")]
        CapacityExceeded(String),

        #[error("Invalid memory range: {0}")]
        SizeOutOfRange(i64),

        #[error("Access of {length} bytes at {handle} exceeds the allocated range")]
        OutOfBounds { handle: i64, length: usize },

        #[error("Index {index} out of bounds for {length} bytes")]
        IndexOutOfBounds { index: usize, length: usize },

        #[error("Registration conflict: {0}")]
        RegistrationConflict(String),

        #[error("Not an instance attribute: {0}")]
        NotAnInstanceAttribute(String),

        #[error("Invalid attribute offset {offset} for {class}")]
        InvalidAttributeOffset { class: String, offset: i64 },

        #[error("Type mismatch: expected {expected}, found {found}")]
        TypeMismatch {
            expected: &'static str,
            found: &'static str,
        },

        #[error("Unknown class: {0}")]
        UnknownClass(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;

    #[test]
    fn test_error_messages() {
        let err = Error::NotBaseAddress {
            handle: 42,
            offset: 3,
        };
        assert_eq!(
            err.to_string(),
            "Not the base address of an allocated memory range: 42 (offset = 3)"
        );
        assert_eq!(Error::InvalidHandle(-1).to_string(), "Invalid handle: -1");
    }
}
