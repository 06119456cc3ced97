//! Attribute offset registry
//!
//! Offsets are not memory offsets. An offset is the index of an attribute in
//! the registered attribute list of a class:
//!
//! ```text
//! Entity   { id }
//!   └─→ Person { name, age }
//!
//! Person → [Entity#id, Person#name, Person#age]
//!              0           1            2
//! ```
//!
//! Every class gets its own entry, even if that repeats the lists of its
//! superclasses, so resolving an offset is a single scan.

use super::class::{AttributeDescriptor, AttributeRef, ClassIntrospector};
use super::instance::{Object, ObjectRef};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Immutable attribute list of one class
pub type AttributeList = Arc<[AttributeDescriptor]>;

/// Process-lifetime cache of class attribute layouts
pub struct AttributeRegistry {
    introspector: Arc<dyn ClassIntrospector>,
    entries: DashMap<String, AttributeList>,
}

impl AttributeRegistry {
    pub fn new(introspector: Arc<dyn ClassIntrospector>) -> Self {
        Self {
            introspector,
            entries: DashMap::new(),
        }
    }

    /// Attribute list of `class`, registering it on first use
    pub fn ensure_registered(&self, class: &str) -> Result<AttributeList> {
        if let Some(entry) = self.entries.get(class) {
            return Ok(entry.value().clone());
        }

        // The vacant entry holds the shard lock, so concurrent callers
        // for the same class wait and then see the inserted list.
        match self.entries.entry(class.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let attributes = self.collect_attributes(class)?;
                Ok(entry.insert(attributes).value().clone())
            }
        }
    }

    /// Register `class` explicitly. Fails if it is already registered.
    pub fn register(&self, class: &str) -> Result<AttributeList> {
        match self.entries.entry(class.to_string()) {
            Entry::Occupied(_) => Err(Error::RegistrationConflict(format!(
                "Attributes already registered for {}",
                class
            ))),
            Entry::Vacant(entry) => {
                let attributes = self.collect_attributes(class)?;
                Ok(entry.insert(attributes).value().clone())
            }
        }
    }

    /// Walk the hierarchy and build the superclass-first instance attribute list
    fn collect_attributes(&self, class: &str) -> Result<AttributeList> {
        let mut hierarchy = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(class.to_string());

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                return Err(Error::RegistrationConflict(format!(
                    "Cyclic class hierarchy at {}",
                    name
                )));
            }
            current = self.introspector.superclass(&name)?;
            hierarchy.push(name);
        }

        let mut attributes: Vec<AttributeDescriptor> = Vec::new();
        for name in hierarchy.iter().rev() {
            for attribute in self.introspector.declared_attributes(name)? {
                // non-instance attributes are always discarded
                if attribute.is_static {
                    continue;
                }
                let duplicate = attributes.iter().any(|existing| {
                    existing.declaring_type == attribute.declaring_type
                        && existing.name == attribute.name
                });
                if !duplicate {
                    attributes.push(attribute);
                }
            }
        }

        debug!(class, attributes = attributes.len(), "Registered class attributes");
        Ok(attributes.into())
    }

    /// Registered list of `class`, if any
    pub fn entry(&self, class: &str) -> Option<AttributeList> {
        self.entries.get(class).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_instance_attribute(&self, attribute: &AttributeRef) -> Result<()> {
        let declared = self
            .introspector
            .declared_attributes(&attribute.declaring_type)?;

        if declared
            .iter()
            .any(|descriptor| attribute.matches(descriptor) && descriptor.is_static)
        {
            return Err(Error::NotAnInstanceAttribute(attribute.to_string()));
        }
        Ok(())
    }

    /// Offset of one attribute within the layout of `class`
    pub fn attribute_offset(&self, class: &str, attribute: &AttributeRef) -> Result<i64> {
        let attributes = self.ensure_registered(class)?;
        self.ensure_instance_attribute(attribute)?;
        offset_in(&attributes, class, attribute)
    }

    /// Offsets of several attributes within the layout of `class`
    pub fn attribute_offsets(&self, class: &str, attributes: &[AttributeRef]) -> Result<Vec<i64>> {
        let registered = self.ensure_registered(class)?;

        attributes
            .iter()
            .map(|attribute| {
                self.ensure_instance_attribute(attribute)?;
                offset_in(&registered, class, attribute)
            })
            .collect()
    }

    /// The most specific declaring type among `attributes`
    ///
    /// `None` for an empty batch.
    pub fn most_specific_class(&self, attributes: &[AttributeRef]) -> Result<Option<String>> {
        let Some(first) = attributes.first() else {
            return Ok(None);
        };

        let mut class = first.declaring_type.as_str();
        for attribute in &attributes[1..] {
            let candidate = attribute.declaring_type.as_str();
            // a different declaring type that inherits from the current one is more specific
            if candidate != class && self.introspector.is_subclass_of(candidate, class)? {
                class = candidate;
            }
        }

        Ok(Some(class.to_string()))
    }

    /// Offsets of `attributes` within the layout of their most specific declaring type
    pub fn attribute_offsets_of(&self, attributes: &[AttributeRef]) -> Result<Vec<i64>> {
        match self.most_specific_class(attributes)? {
            Some(class) => self.attribute_offsets(&class, attributes),
            None => Ok(Vec::new()),
        }
    }

    /// Create an object of `class` with default attribute values
    pub fn instantiate(&self, class: &str) -> Result<ObjectRef> {
        let attributes = self.ensure_registered(class)?;
        Ok(Arc::new(Object::new(class, &attributes)))
    }
}

fn offset_in(attributes: &[AttributeDescriptor], class: &str, attribute: &AttributeRef) -> Result<i64> {
    attributes
        .iter()
        .position(|descriptor| attribute.matches(descriptor))
        .map(|index| index as i64)
        .ok_or_else(|| {
            Error::RegistrationConflict(format!(
                "Inconsistent attribute registration for {} in {}",
                attribute, class
            ))
        })
}
