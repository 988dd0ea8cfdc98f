//! Dynamic records: heap objects and types exposed for by-name field access.

use std::fmt;
use std::rc::Rc;

use heapq_snapshot::{FieldValue, HeapObject, HeapSnapshot, TypeDescriptor};

use crate::error::ExecError;
use crate::value::{Value, format_address};

/// A live heap object. Field values are decoded from the snapshot when read.
#[derive(Clone, Copy)]
pub struct InstanceRecord<'h> {
    heap: &'h dyn HeapSnapshot,
    object: HeapObject<'h>,
}

impl<'h> InstanceRecord<'h> {
    pub(crate) fn new(heap: &'h dyn HeapSnapshot, object: HeapObject<'h>) -> Self {
        Self { heap, object }
    }

    pub fn address(&self) -> u64 {
        self.object.address
    }

    pub fn type_of(&self) -> &'h TypeDescriptor {
        self.object.ty
    }

    pub fn field(&self, name: &str) -> Result<Value<'h>, ExecError> {
        let slot = self
            .object
            .ty
            .field_index(name)
            .ok_or_else(|| ExecError::FieldNotFound {
                owner: self.object.ty.name().to_string(),
                field: name.to_string(),
            })?;
        self.field_at(slot)
    }

    /// Field values as stored, references unresolved.
    pub fn raw_values(&self) -> &'h [FieldValue] {
        self.object.values
    }

    pub fn field_at(&self, slot: usize) -> Result<Value<'h>, ExecError> {
        let fields = self.object.ty.fields();
        match (fields.get(slot), self.object.values.get(slot)) {
            (Some(_), Some(raw)) => decode(self.heap, raw),
            (field, _) => Err(ExecError::FieldNotFound {
                owner: self.object.ty.name().to_string(),
                field: field.map_or_else(|| format!("#{slot}"), |field| field.name.clone()),
            }),
        }
    }
}

impl fmt::Display for InstanceRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.object.ty.name(), format_address(self.object.address))
    }
}

/// Type-level data of one type, addressed by type name.
#[derive(Clone, Copy)]
pub struct ClassRecord<'h> {
    heap: &'h dyn HeapSnapshot,
    ty: &'h TypeDescriptor,
}

impl<'h> ClassRecord<'h> {
    pub(crate) fn new(heap: &'h dyn HeapSnapshot, ty: &'h TypeDescriptor) -> Self {
        Self { heap, ty }
    }

    pub fn type_of(&self) -> &'h TypeDescriptor {
        self.ty
    }

    pub fn field(&self, name: &str) -> Result<Value<'h>, ExecError> {
        let field = self
            .ty
            .static_field(name)
            .ok_or_else(|| ExecError::FieldNotFound {
                owner: format!("class {}", self.ty.name()),
                field: name.to_string(),
            })?;
        decode(self.heap, &field.value)
    }

    pub fn field_at(&self, slot: usize) -> Result<Value<'h>, ExecError> {
        match self.ty.statics().get(slot) {
            Some(field) => decode(self.heap, &field.value),
            None => Err(ExecError::FieldNotFound {
                owner: format!("class {}", self.ty.name()),
                field: format!("#{slot}"),
            }),
        }
    }
}

impl fmt::Display for ClassRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.ty.name())
    }
}

// References are resolved only here, when the field is read.
fn decode<'h>(heap: &'h dyn HeapSnapshot, raw: &'h FieldValue) -> Result<Value<'h>, ExecError> {
    Ok(match raw {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(value) => Value::Bool(*value),
        FieldValue::Int(value) => Value::Int(*value),
        FieldValue::Float(value) => Value::Float(*value),
        FieldValue::Str(value) => Value::Str(Rc::from(value.as_str())),
        FieldValue::Ref(address) => {
            let object = heap
                .object_at(*address)
                .ok_or(ExecError::InvalidObjectAddress(*address))?;
            Value::Instance(InstanceRecord::new(heap, object))
        }
    })
}
