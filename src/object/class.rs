//! Class descriptions for object-relative access
//!
//! The registry never inspects host types itself. A [`ClassIntrospector`]
//! supplies the inheritance chain and the attributes each class declares.
//! [`ClassCatalog`] is an in-memory introspector built from explicit
//! definitions.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Storage kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Byte,
    Bool,
    Short,
    Char,
    Int,
    Float,
    Long,
    Double,
    Reference,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Byte => "byte",
            ValueKind::Bool => "bool",
            ValueKind::Short => "short",
            ValueKind::Char => "char",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Long => "long",
            ValueKind::Double => "double",
            ValueKind::Reference => "reference",
        }
    }
}

/// An attribute as declared by its class
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub declaring_type: String,
    pub name: String,
    pub kind: ValueKind,
    /// Class-level attributes never get an offset
    pub is_static: bool,
}

/// Identifies an attribute by its declaring type and name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeRef {
    pub declaring_type: String,
    pub name: String,
}

impl AttributeRef {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
        }
    }

    pub fn matches(&self, descriptor: &AttributeDescriptor) -> bool {
        descriptor.declaring_type == self.declaring_type && descriptor.name == self.name
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.declaring_type, self.name)
    }
}

/// Host capability: describe classes by name
pub trait ClassIntrospector: Send + Sync {
    /// Direct superclass, `None` for a root class
    fn superclass(&self, class: &str) -> Result<Option<String>>;

    /// Attributes declared by `class` itself in declaration order, static ones included
    fn declared_attributes(&self, class: &str) -> Result<Vec<AttributeDescriptor>>;

    /// Whether `class` is `ancestor` or inherits from it
    fn is_subclass_of(&self, class: &str, ancestor: &str) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut current = Some(class.to_string());

        while let Some(name) = current {
            if name == ancestor {
                return Ok(true);
            }
            if !visited.insert(name.clone()) {
                return Err(Error::RegistrationConflict(format!(
                    "Cyclic class hierarchy at {}",
                    name
                )));
            }
            current = self.superclass(&name)?;
        }

        Ok(false)
    }
}

/// Definition of one class for a [`ClassCatalog`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub name: String,
    pub superclass: Option<String>,
    pub attributes: Vec<AttributeDescriptor>,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            attributes: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn attribute(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.declare(name.into(), kind, false)
    }

    pub fn static_attribute(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.declare(name.into(), kind, true)
    }

    fn declare(mut self, name: String, kind: ValueKind, is_static: bool) -> Self {
        self.attributes.push(AttributeDescriptor {
            declaring_type: self.name.clone(),
            name,
            kind,
            is_static,
        });
        self
    }
}

/// In-memory class introspector
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    classes: HashMap<String, ClassDefinition>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class definition, replacing an earlier one with the same name
    pub fn define(&mut self, definition: ClassDefinition) -> &mut Self {
        self.classes.insert(definition.name.clone(), definition);
        self
    }

    pub fn get(&self, class: &str) -> Option<&ClassDefinition> {
        self.classes.get(class)
    }

    fn lookup(&self, class: &str) -> Result<&ClassDefinition> {
        self.classes
            .get(class)
            .ok_or_else(|| Error::UnknownClass(class.to_string()))
    }
}

impl ClassIntrospector for ClassCatalog {
    fn superclass(&self, class: &str) -> Result<Option<String>> {
        Ok(self.lookup(class)?.superclass.clone())
    }

    fn declared_attributes(&self, class: &str) -> Result<Vec<AttributeDescriptor>> {
        Ok(self.lookup(class)?.attributes.clone())
    }
}
