//! Objects addressed by attribute offset

use super::class::{AttributeDescriptor, ValueKind};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared object reference
pub type ObjectRef = Arc<Object>;

/// A single attribute value
#[derive(Debug, Clone)]
pub enum Value {
    Byte(i8),
    Bool(bool),
    Short(i16),
    Char(u16),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Reference(Option<ObjectRef>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Byte(_) => ValueKind::Byte,
            Value::Bool(_) => ValueKind::Bool,
            Value::Short(_) => ValueKind::Short,
            Value::Char(_) => ValueKind::Char,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::Reference(_) => ValueKind::Reference,
        }
    }

    /// Zero value of a kind
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Byte => Value::Byte(0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Short => Value::Short(0),
            ValueKind::Char => Value::Char(0),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Reference => Value::Reference(None),
        }
    }
}

/// Rust types that map onto exactly one [`ValueKind`]
pub trait AttributeValue: Sized {
    const KIND: ValueKind;

    fn from_value(value: Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

macro_rules! impl_attribute_value {
    ($ty:ty, $variant:ident) => {
        impl AttributeValue for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

impl_attribute_value!(i8, Byte);
impl_attribute_value!(bool, Bool);
impl_attribute_value!(i16, Short);
impl_attribute_value!(u16, Char);
impl_attribute_value!(i32, Int);
impl_attribute_value!(f32, Float);
impl_attribute_value!(i64, Long);
impl_attribute_value!(f64, Double);
impl_attribute_value!(Option<ObjectRef>, Reference);

/// An object whose attributes are laid out in registry order
///
/// Attribute offsets index into the layout of the object's own class.
pub struct Object {
    class: String,
    attributes: RwLock<Vec<Value>>,
}

impl Object {
    /// Create an object with default values for every attribute in `layout`
    pub fn new(class: impl Into<String>, layout: &[AttributeDescriptor]) -> Self {
        Self {
            class: class.into(),
            attributes: RwLock::new(
                layout
                    .iter()
                    .map(|attribute| Value::default_for(attribute.kind))
                    .collect(),
            ),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.read().len()
    }

    fn index(&self, offset: i64, count: usize) -> Result<usize> {
        usize::try_from(offset)
            .ok()
            .filter(|&index| index < count)
            .ok_or_else(|| Error::InvalidAttributeOffset {
                class: self.class.clone(),
                offset,
            })
    }

    /// Read the value at an attribute offset
    pub fn get(&self, offset: i64) -> Result<Value> {
        let attributes = self.attributes.read();
        let index = self.index(offset, attributes.len())?;
        Ok(attributes[index].clone())
    }

    /// Replace the value at an attribute offset. The kind must not change.
    pub fn set(&self, offset: i64, value: Value) -> Result<()> {
        let mut attributes = self.attributes.write();
        let index = self.index(offset, attributes.len())?;

        let current = attributes[index].kind();
        if current != value.kind() {
            return Err(Error::TypeMismatch {
                expected: current.name(),
                found: value.kind().name(),
            });
        }
        attributes[index] = value;
        Ok(())
    }

    /// Typed read
    pub fn get_as<T: AttributeValue>(&self, offset: i64) -> Result<T> {
        let value = self.get(offset)?;
        let found = value.kind();
        T::from_value(value).ok_or(Error::TypeMismatch {
            expected: T::KIND.name(),
            found: found.name(),
        })
    }
}

// Objects may reference each other cyclically, so only the class is printed.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class)
            .field("attributes", &self.attribute_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Vec<AttributeDescriptor> {
        [("id", ValueKind::Long), ("active", ValueKind::Bool), ("next", ValueKind::Reference)]
            .into_iter()
            .map(|(name, kind)| AttributeDescriptor {
                declaring_type: "Node".to_string(),
                name: name.to_string(),
                kind,
                is_static: false,
            })
            .collect()
    }

    #[test]
    fn test_default_values() -> Result<()> {
        let object = Object::new("Node", &layout());

        assert_eq!(object.attribute_count(), 3);
        assert_eq!(object.get_as::<i64>(0)?, 0);
        assert!(!object.get_as::<bool>(1)?);
        assert!(object.get_as::<Option<ObjectRef>>(2)?.is_none());
        Ok(())
    }

    #[test]
    fn test_set_and_get() -> Result<()> {
        let object = Object::new("Node", &layout());
        let other = Arc::new(Object::new("Node", &layout()));

        object.set(0, Value::Long(42))?;
        object.set(2, Value::Reference(Some(other.clone())))?;

        assert_eq!(object.get_as::<i64>(0)?, 42);
        let next = object.get_as::<Option<ObjectRef>>(2)?.expect("Reference should be set");
        assert!(Arc::ptr_eq(&next, &other));
        Ok(())
    }

    #[test]
    fn test_kind_is_enforced() {
        let object = Object::new("Node", &layout());

        assert_eq!(
            object.set(0, Value::Int(1)),
            Err(Error::TypeMismatch {
                expected: "long",
                found: "int"
            })
        );
        assert!(matches!(
            object.get_as::<i32>(0),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_offsets() {
        let object = Object::new("Node", &layout());

        assert!(matches!(
            object.get(3),
            Err(Error::InvalidAttributeOffset { offset: 3, .. })
        ));
        assert!(matches!(
            object.get(-1),
            Err(Error::InvalidAttributeOffset { offset: -1, .. })
        ));
    }
}
