//! Object-relative access
//!
//! Lets callers address "attribute K of object X" with the same typed
//! get/set vocabulary used for handles.
//!
//! ```text
//! ClassIntrospector (host capability)
//!   └─→ AttributeRegistry (class → [attribute], cached)
//!         └─→ offset = index in that list
//!               └─→ Object (values stored in registry order)
//! ```

pub mod class;
pub mod instance;
pub mod registry;

pub use class::{
    AttributeDescriptor, AttributeRef, ClassCatalog, ClassDefinition, ClassIntrospector, ValueKind,
};
pub use instance::{AttributeValue, Object, ObjectRef, Value};
pub use registry::{AttributeList, AttributeRegistry};
