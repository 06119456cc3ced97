//! End-to-end tests of the public memory API

use photonmem::error::{Error, Result};
use photonmem::memory::address::{decode, Address};
use photonmem::memory::ByteOrder;
use photonmem::object::{AttributeRef, ClassDefinition, ValueKind};
use photonmem::{ClassCatalog, MemoryAccessor, MemoryConfig};
use std::sync::Arc;

fn catalog() -> ClassCatalog {
    let mut catalog = ClassCatalog::new();
    catalog
        .define(
            ClassDefinition::new("Entity")
                .attribute("id", ValueKind::Long)
                .static_attribute("COUNT", ValueKind::Int),
        )
        .define(
            ClassDefinition::new("Person")
                .extends("Entity")
                .attribute("name", ValueKind::Reference)
                .attribute("age", ValueKind::Short),
        )
        .define(
            ClassDefinition::new("Employee")
                .extends("Person")
                .attribute("salary", ValueKind::Double)
                .attribute("active", ValueKind::Bool),
        );
    catalog
}

fn accessor() -> Result<MemoryAccessor> {
    MemoryAccessor::new(&MemoryConfig::default(), Arc::new(catalog()))
}

#[test]
fn test_small_and_big_routing() -> Result<()> {
    let memory = accessor()?;

    let small = memory.allocate(1024)?;
    let big = memory.allocate(1025)?;

    assert!(matches!(decode(small)?, Address::Small(_)));
    assert!(matches!(decode(big)?, Address::Big(_)));
    assert_eq!(memory.allocation_size(small)?, 1024);
    assert_eq!(memory.allocation_size(big)?, 1025);

    memory.set_long(big + 1017, -1)?;
    assert_eq!(memory.get_long(big + 1017)?, -1);
    assert!(matches!(
        memory.get_long(big + 1018),
        Err(Error::OutOfBounds { .. })
    ));
    Ok(())
}

#[test]
fn test_pointer_arithmetic_across_array() -> Result<()> {
    let memory = accessor()?;
    let base = memory.allocate(10 * 8)?;

    for i in 0..10 {
        memory.set_double(base + i * 8, i as f64 * 1.5)?;
    }

    let mut values = [0f64; 10];
    memory.copy_to_array(base, &mut values)?;
    assert_eq!(values[9], 13.5);
    assert_eq!(memory.get_double(base + 4 * 8)?, 6.0);
    Ok(())
}

#[test]
fn test_reallocate_between_categories() -> Result<()> {
    let memory = accessor()?;

    let handle = memory.allocate(100)?;
    memory.fill(handle, 100, 3)?;

    let big = memory.reallocate(handle, 10_000)?;
    assert!(matches!(decode(big)?, Address::Big(_)));
    assert_eq!(memory.get_byte(big + 99)?, 3);
    assert_eq!(memory.get_byte(big + 100)?, 0);

    let small = memory.reallocate(big, 50)?;
    assert!(matches!(decode(small)?, Address::Small(_)));
    assert_eq!(memory.get_byte(small + 49)?, 3);
    assert_eq!(memory.stats().big_live_allocations, 0);
    Ok(())
}

#[test]
fn test_byte_order_configuration() -> Result<()> {
    let config = MemoryConfig {
        byte_order: ByteOrder::Big,
        ..MemoryConfig::default()
    };
    let memory = MemoryAccessor::new(&config, Arc::new(catalog()))?;
    let handle = memory.allocate(4)?;

    memory.set_int(handle, 0x0102_0304)?;
    let mut bytes = [0i8; 4];
    memory.copy_to_array(handle, &mut bytes)?;
    assert_eq!(bytes, [1, 2, 3, 4]);

    let little = memory.to_reversing();
    assert_eq!(little.byte_order(), ByteOrder::Little);
    assert_eq!(little.get_int(handle)?, 0x0403_0201);
    Ok(())
}

#[test]
fn test_attribute_offsets() -> Result<()> {
    let memory = accessor()?;

    let id = AttributeRef::new("Entity", "id");
    let name = AttributeRef::new("Person", "name");
    let salary = AttributeRef::new("Employee", "salary");

    assert_eq!(memory.attribute_offset("Entity", &id)?, 0);
    assert_eq!(memory.attribute_offset("Employee", &id)?, 0);
    assert_eq!(memory.attribute_offset("Employee", &salary)?, 3);
    assert_eq!(
        memory.attribute_offsets("Person", &[name.clone(), id.clone()])?,
        vec![1, 0]
    );

    // Most specific declaring type decides the layout
    assert_eq!(
        memory.attribute_offsets_of(&[id.clone(), salary.clone(), name.clone()])?,
        vec![0, 3, 1]
    );
    assert!(memory.attribute_offsets_of(&[])?.is_empty());

    assert_eq!(
        memory.attribute_offset("Entity", &AttributeRef::new("Entity", "COUNT")),
        Err(Error::NotAnInstanceAttribute("Entity#COUNT".to_string()))
    );
    assert!(matches!(
        memory.attribute_offset("Entity", &salary),
        Err(Error::RegistrationConflict(_))
    ));
    assert!(matches!(
        memory.attribute_offset("Robot", &id),
        Err(Error::UnknownClass(_))
    ));
    Ok(())
}

#[test]
fn test_class_initialization() -> Result<()> {
    let memory = accessor()?;

    let layout = memory.ensure_class_initialized("Employee")?;
    let names: Vec<_> = layout.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "age", "salary", "active"]);

    let again = memory.ensure_class_initialized("Employee")?;
    assert!(Arc::ptr_eq(&layout, &again));
    Ok(())
}

#[test]
fn test_object_attribute_access() -> Result<()> {
    let memory = accessor()?;
    let offsets = memory.attribute_offsets(
        "Employee",
        &[
            AttributeRef::new("Entity", "id"),
            AttributeRef::new("Person", "name"),
            AttributeRef::new("Person", "age"),
            AttributeRef::new("Employee", "salary"),
            AttributeRef::new("Employee", "active"),
        ],
    )?;
    let (id, name, age, salary, active) = (offsets[0], offsets[1], offsets[2], offsets[3], offsets[4]);

    let employee = memory.instantiate_blank("Employee")?;
    let label = memory.instantiate_blank("Entity")?;
    assert_eq!(memory.get_long_of(&employee, id)?, 0);
    assert!(memory.get_object_of(&employee, name)?.is_none());

    memory.set_long_of(&employee, id, 7)?;
    memory.set_short_of(&employee, age, 41)?;
    memory.set_double_of(&employee, salary, 1234.5)?;
    memory.set_bool_of(&employee, active, true)?;
    memory.set_object_of(&employee, name, Some(label.clone()))?;

    assert_eq!(memory.get_long_of(&employee, id)?, 7);
    assert_eq!(memory.get_short_of(&employee, age)?, 41);
    assert_eq!(memory.get_double_of(&employee, salary)?, 1234.5);
    assert!(memory.get_bool_of(&employee, active)?);
    let linked = memory.get_object_of(&employee, name)?;
    assert!(linked.is_some_and(|object| Arc::ptr_eq(&object, &label)));

    assert!(matches!(
        memory.get_int_of(&employee, id),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        memory.get_long_of(&employee, 5),
        Err(Error::InvalidAttributeOffset { .. })
    ));
    Ok(())
}

#[test]
fn test_shared_heap_between_clones() -> Result<()> {
    let memory = accessor()?;
    let other = memory.clone();

    let handle = memory.allocate(16)?;
    other.set_int(handle, 99)?;
    assert_eq!(memory.get_int(handle)?, 99);

    other.free(handle)?;
    assert_eq!(memory.get_int(handle), Err(Error::InvalidHandle(handle)));
    Ok(())
}

#[test]
fn test_stats_serialize() -> Result<()> {
    let memory = accessor()?;
    memory.allocate(32)?;
    memory.allocate(32)?;
    memory.allocate(3000)?;

    let stats = memory.stats();
    assert_eq!(stats.small_live_chunks, 2);
    assert_eq!(stats.small_live_bytes, 64);
    assert_eq!(stats.big_live_bytes, 3000);

    let json = serde_json::to_value(&stats).map_err(|e| Error::Config(e.to_string()))?;
    assert_eq!(json["size_classes"][0]["chunk_size"], 32);
    assert_eq!(json["size_classes"][0]["slot_count"], 127);
    Ok(())
}
