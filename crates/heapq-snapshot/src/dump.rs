//! JSON dump format shared by dump files and live agents.

use facet::Facet;

use crate::heap::{HeapSnapshot, MemorySnapshot};
use crate::model::{FieldDescriptor, FieldValue, InvariantError, StaticField, TypeDescriptor};

#[derive(Facet, Debug, Clone)]
pub struct SnapshotDump {
    pub types: Vec<TypeDump>,
    pub objects: Vec<ObjectDump>,
}

#[derive(Facet, Debug, Clone)]
pub struct TypeDump {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    #[facet(default)]
    pub statics: Vec<StaticField>,
}

#[derive(Facet, Debug, Clone)]
pub struct ObjectDump {
    pub address: u64,
    pub type_name: String,
    pub values: Vec<FieldValue>,
}

impl SnapshotDump {
    pub fn into_snapshot(self) -> Result<MemorySnapshot, InvariantError> {
        let mut builder = MemorySnapshot::builder();
        for ty in self.types {
            builder = builder.with_type(TypeDescriptor::new(ty.name, ty.fields, ty.statics)?);
        }
        for object in self.objects {
            builder = builder.with_object(object.address, object.type_name, object.values);
        }
        builder.build()
    }

    /// Captures any snapshot in dump form, e.g. to persist it as a file.
    pub fn capture(heap: &dyn HeapSnapshot) -> Self {
        let types = heap
            .types()
            .map(|ty| TypeDump {
                name: ty.name().to_string(),
                fields: ty.fields().to_vec(),
                statics: ty.statics().to_vec(),
            })
            .collect();
        let objects = heap
            .objects()
            .map(|object| ObjectDump {
                address: object.address,
                type_name: object.ty.name().to_string(),
                values: object.values.to_vec(),
            })
            .collect();
        Self { types, objects }
    }
}
