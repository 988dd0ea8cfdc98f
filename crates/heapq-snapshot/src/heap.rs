use std::collections::HashMap;

use crate::model::{FieldValue, HeapObject, InvariantError, TypeDescriptor};

/// A point-in-time, read-only view of a process heap.
///
/// Whoever holds the handle owns it exclusively; `release` frees whatever the
/// provider keeps behind it and must be safe to call more than once.
pub trait HeapSnapshot: Send {
    /// Every known type, in snapshot order.
    fn types(&self) -> Box<dyn Iterator<Item = &TypeDescriptor> + '_>;

    fn type_named(&self, name: &str) -> Option<&TypeDescriptor>;

    /// Every live object, in the snapshot's enumeration order.
    fn objects(&self) -> Box<dyn Iterator<Item = HeapObject<'_>> + '_>;

    /// The object starting at `address`, if one does.
    fn object_at(&self, address: u64) -> Option<HeapObject<'_>>;

    fn object_count(&self) -> usize;

    fn release(&mut self);
}

struct StoredObject {
    address: u64,
    type_slot: usize,
    values: Vec<FieldValue>,
}

/// Snapshot held entirely in memory, built from a dump or by hand.
pub struct MemorySnapshot {
    types: Vec<TypeDescriptor>,
    type_index: HashMap<String, usize>,
    objects: Vec<StoredObject>,
    address_index: HashMap<u64, usize>,
    released: bool,
}

impl MemorySnapshot {
    pub fn builder() -> MemorySnapshotBuilder {
        MemorySnapshotBuilder::default()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn view<'a>(&'a self, object: &'a StoredObject) -> HeapObject<'a> {
        HeapObject {
            address: object.address,
            ty: &self.types[object.type_slot],
            values: &object.values,
        }
    }
}

impl HeapSnapshot for MemorySnapshot {
    fn types(&self) -> Box<dyn Iterator<Item = &TypeDescriptor> + '_> {
        Box::new(self.types.iter())
    }

    fn type_named(&self, name: &str) -> Option<&TypeDescriptor> {
        self.type_index.get(name).map(|slot| &self.types[*slot])
    }

    fn objects(&self) -> Box<dyn Iterator<Item = HeapObject<'_>> + '_> {
        Box::new(self.objects.iter().map(|object| self.view(object)))
    }

    fn object_at(&self, address: u64) -> Option<HeapObject<'_>> {
        self.address_index
            .get(&address)
            .map(|slot| self.view(&self.objects[*slot]))
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.objects = Vec::new();
        self.address_index = HashMap::new();
        self.types = Vec::new();
        self.type_index = HashMap::new();
        tracing::debug!("memory snapshot released");
    }
}

#[derive(Default)]
pub struct MemorySnapshotBuilder {
    types: Vec<TypeDescriptor>,
    objects: Vec<(u64, String, Vec<FieldValue>)>,
}

impl MemorySnapshotBuilder {
    pub fn with_type(mut self, ty: TypeDescriptor) -> Self {
        self.types.push(ty);
        self
    }

    pub fn with_object(
        mut self,
        address: u64,
        type_name: impl Into<String>,
        values: Vec<FieldValue>,
    ) -> Self {
        self.objects.push((address, type_name.into(), values));
        self
    }

    pub fn build(self) -> Result<MemorySnapshot, InvariantError> {
        let mut type_index = HashMap::with_capacity(self.types.len());
        for (slot, ty) in self.types.iter().enumerate() {
            if type_index.insert(ty.name().to_string(), slot).is_some() {
                return Err(InvariantError::DuplicateType(ty.name().to_string()));
            }
        }

        let mut objects = Vec::with_capacity(self.objects.len());
        let mut address_index = HashMap::with_capacity(self.objects.len());
        for (address, type_name, values) in self.objects {
            if address == 0 {
                return Err(InvariantError::ZeroAddress);
            }
            let Some(&type_slot) = type_index.get(&type_name) else {
                return Err(InvariantError::UnknownType { address, type_name });
            };
            let ty = &self.types[type_slot];
            if values.len() != ty.fields().len() {
                return Err(InvariantError::ValueCount {
                    address,
                    expected: ty.fields().len(),
                    got: values.len(),
                });
            }
            for (field, value) in ty.fields().iter().zip(&values) {
                if !field.kind.admits(value) {
                    return Err(InvariantError::KindMismatch {
                        owner: format!("{type_name}@0x{address:x}"),
                        field: field.name.clone(),
                        expected: field.kind,
                    });
                }
            }
            if address_index.insert(address, objects.len()).is_some() {
                return Err(InvariantError::DuplicateAddress(address));
            }
            objects.push(StoredObject {
                address,
                type_slot,
                values,
            });
        }

        Ok(MemorySnapshot {
            types: self.types,
            type_index,
            objects,
            address_index,
            released: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDescriptor, FieldKind};

    fn foo_type() -> TypeDescriptor {
        TypeDescriptor::new(
            "Foo",
            vec![FieldDescriptor::new("Bar", FieldKind::Int)],
            vec![],
        )
        .expect("valid type")
    }

    #[test]
    fn objects_enumerate_in_insertion_order() {
        let heap = MemorySnapshot::builder()
            .with_type(foo_type())
            .with_object(0x2000, "Foo", vec![FieldValue::Int(2)])
            .with_object(0x1000, "Foo", vec![FieldValue::Int(1)])
            .build()
            .expect("valid snapshot");
        let addresses: Vec<u64> = heap.objects().map(|object| object.address).collect();
        assert_eq!(addresses, vec![0x2000, 0x1000]);
        assert_eq!(heap.object_at(0x1000).map(|o| o.values[0].clone()), Some(FieldValue::Int(1)));
        assert!(heap.object_at(0x1008).is_none());
    }

    #[test]
    fn build_rejects_undeclared_type() {
        let err = MemorySnapshot::builder()
            .with_object(0x1000, "Missing", vec![])
            .build()
            .err()
            .expect("undeclared type must fail");
        assert!(matches!(err, InvariantError::UnknownType { address: 0x1000, .. }));
    }

    #[test]
    fn build_rejects_wrong_value_count() {
        let err = MemorySnapshot::builder()
            .with_type(foo_type())
            .with_object(0x1000, "Foo", vec![])
            .build()
            .err()
            .expect("missing slot must fail");
        assert_eq!(
            err,
            InvariantError::ValueCount {
                address: 0x1000,
                expected: 1,
                got: 0
            }
        );
    }

    #[test]
    fn build_rejects_duplicate_addresses() {
        let err = MemorySnapshot::builder()
            .with_type(foo_type())
            .with_object(0x1000, "Foo", vec![FieldValue::Int(1)])
            .with_object(0x1000, "Foo", vec![FieldValue::Int(2)])
            .build()
            .err()
            .expect("duplicate address must fail");
        assert_eq!(err, InvariantError::DuplicateAddress(0x1000));
    }

    #[test]
    fn release_is_idempotent_and_empties_the_heap() {
        let mut heap = MemorySnapshot::builder()
            .with_type(foo_type())
            .with_object(0x1000, "Foo", vec![FieldValue::Int(1)])
            .build()
            .expect("valid snapshot");
        heap.release();
        heap.release();
        assert!(heap.is_released());
        assert_eq!(heap.object_count(), 0);
        assert!(heap.type_named("Foo").is_none());
    }
}
