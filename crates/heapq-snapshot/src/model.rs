use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use facet::Facet;

#[derive(Debug, Clone, PartialEq)]
pub enum InvariantError {
    EmptyField(&'static str),
    ZeroAddress,
    DuplicateType(String),
    DuplicateField { owner: String, field: String },
    DuplicateAddress(u64),
    UnknownType { address: u64, type_name: String },
    ValueCount {
        address: u64,
        expected: usize,
        got: usize,
    },
    KindMismatch {
        owner: String,
        field: String,
        expected: FieldKind,
    },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "{field} must be non-empty"),
            Self::ZeroAddress => write!(f, "object address must be non-zero"),
            Self::DuplicateType(name) => write!(f, "type {name} is declared more than once"),
            Self::DuplicateField { owner, field } => {
                write!(f, "field {field} is declared more than once on {owner}")
            }
            Self::DuplicateAddress(address) => {
                write!(f, "two objects share address 0x{address:x}")
            }
            Self::UnknownType { address, type_name } => {
                write!(f, "object at 0x{address:x} has undeclared type {type_name}")
            }
            Self::ValueCount {
                address,
                expected,
                got,
            } => write!(
                f,
                "object at 0x{address:x} carries {got} field values, its type declares {expected}"
            ),
            Self::KindMismatch {
                owner,
                field,
                expected,
            } => write!(
                f,
                "value of {owner}.{field} does not match declared kind {}",
                expected.as_str()
            ),
        }
    }
}

impl Error for InvariantError {}

/// Declared kind of a field slot.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    String,
    /// Pointer to another heap object, or null.
    Reference,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Reference => "reference",
        }
    }

    /// Whether `value` is a legal encoding for a slot of this kind.
    pub fn admits(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::Bool, FieldValue::Bool(_))
                | (Self::Int, FieldValue::Int(_))
                | (Self::Float, FieldValue::Float(_))
                | (Self::String, FieldValue::Str(_) | FieldValue::Null)
                | (Self::Reference, FieldValue::Ref(_) | FieldValue::Null)
        )
    }
}

/// A field slot as the snapshot encodes it.
#[derive(Facet, Debug, Clone, PartialEq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Address of the referent.
    Ref(u64),
}

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Type-level (static) data, addressable through the type name alone.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct StaticField {
    pub name: String,
    pub kind: FieldKind,
    pub value: FieldValue,
}

impl StaticField {
    pub fn new(name: impl Into<String>, kind: FieldKind, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
        }
    }
}

/// Name and field layout of one type in a snapshot.
///
/// The name → slot tables are built once, when the type is first observed,
/// so field resolution at query time is a single hash lookup.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    statics: Vec<StaticField>,
    field_index: HashMap<String, usize>,
    static_index: HashMap<String, usize>,
}

impl TypeDescriptor {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldDescriptor>,
        statics: Vec<StaticField>,
    ) -> Result<Self, InvariantError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvariantError::EmptyField("type name"));
        }

        let mut field_index = HashMap::with_capacity(fields.len());
        for (slot, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(InvariantError::EmptyField("field name"));
            }
            if field_index.insert(field.name.clone(), slot).is_some() {
                return Err(InvariantError::DuplicateField {
                    owner: name,
                    field: field.name.clone(),
                });
            }
        }

        let mut static_index = HashMap::with_capacity(statics.len());
        for (slot, field) in statics.iter().enumerate() {
            if field.name.is_empty() {
                return Err(InvariantError::EmptyField("static field name"));
            }
            if !field.kind.admits(&field.value) {
                return Err(InvariantError::KindMismatch {
                    owner: name,
                    field: field.name.clone(),
                    expected: field.kind,
                });
            }
            if static_index.insert(field.name.clone(), slot).is_some() {
                return Err(InvariantError::DuplicateField {
                    owner: name,
                    field: field.name.clone(),
                });
            }
        }

        Ok(Self {
            name,
            fields,
            statics,
            field_index,
            static_index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    pub fn statics(&self) -> &[StaticField] {
        &self.statics
    }

    pub fn static_field(&self, name: &str) -> Option<&StaticField> {
        self.static_index.get(name).map(|slot| &self.statics[*slot])
    }
}

/// One live object, borrowed from the snapshot that owns it.
#[derive(Debug, Clone, Copy)]
pub struct HeapObject<'h> {
    pub address: u64,
    pub ty: &'h TypeDescriptor,
    /// Slot values in the order of `ty.fields()`.
    pub values: &'h [FieldValue],
}
