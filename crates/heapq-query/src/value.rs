//! Untyped values produced and consumed by query bodies.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use compact_str::CompactString;
use heapq_snapshot::TypeDescriptor;

use crate::error::ExecError;
use crate::eval::Closure;
use crate::record::{ClassRecord, InstanceRecord};

/// Fixed-width hexadecimal rendering used for every address.
pub fn format_address(address: u64) -> String {
    format!("0x{address:016x}")
}

#[derive(Clone)]
pub enum Value<'h> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Address(u64),
    Instance(InstanceRecord<'h>),
    Class(ClassRecord<'h>),
    Type(&'h TypeDescriptor),
    Shape(ShapeRecord<'h>),
    Seq(Sequence<'h>),
    Lambda(Closure<'h>),
}

impl<'h> Value<'h> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Address(_) => "address",
            Self::Instance(_) => "object",
            Self::Class(_) => "class",
            Self::Type(_) => "type",
            Self::Shape(_) => "shape",
            Self::Seq(_) => "sequence",
            Self::Lambda(_) => "lambda",
        }
    }

    pub(crate) fn str(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }

    pub(crate) fn as_bool(&self, context: &str) -> Result<bool, ExecError> {
        match self {
            Self::Bool(value) => Ok(*value),
            other => Err(ExecError::mismatch(context, "bool", other.kind_name())),
        }
    }

    pub(crate) fn as_str(&self, context: &str) -> Result<&str, ExecError> {
        match self {
            Self::Str(value) => Ok(value.as_ref()),
            other => Err(ExecError::mismatch(context, "string", other.kind_name())),
        }
    }

    pub(crate) fn as_count(&self, context: &str) -> Result<usize, ExecError> {
        match self {
            Self::Int(value) => usize::try_from(*value)
                .map_err(|_| ExecError::mismatch(context, "non-negative int", "negative int")),
            other => Err(ExecError::mismatch(context, "int", other.kind_name())),
        }
    }

    pub(crate) fn as_address(&self, context: &str) -> Result<u64, ExecError> {
        match self {
            Self::Address(value) => Ok(*value),
            Self::Int(value) => Ok(*value as u64),
            other => Err(ExecError::mismatch(context, "address", other.kind_name())),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_seq(self, context: &str) -> Result<Sequence<'h>, ExecError> {
        match self {
            Self::Seq(sequence) => Ok(sequence),
            other => Err(ExecError::mismatch(context, "sequence", other.kind_name())),
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
            Self::Address(value) => write!(f, "{}", format_address(*value)),
            Self::Instance(record) => write!(f, "{record}"),
            Self::Class(record) => write!(f, "{record}"),
            Self::Type(ty) => write!(f, "{}", ty.name()),
            Self::Shape(shape) => write!(f, "{shape}"),
            Self::Seq(_) => write!(f, "<sequence>"),
            Self::Lambda(_) => write!(f, "<lambda>"),
        }
    }
}

/// Equality as the `==` operator sees it. Records compare by identity.
pub(crate) fn values_equal(lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Address(a), Value::Address(b)) => a == b,
        (Value::Address(a), Value::Int(b)) | (Value::Int(b), Value::Address(a)) => *a == *b as u64,
        (Value::Instance(a), Value::Instance(b)) => a.address() == b.address(),
        (Value::Class(a), Value::Class(b)) => a.type_of().name() == b.type_of().name(),
        (Value::Type(a), Value::Type(b)) => a.name() == b.name(),
        (Value::Shape(a), Value::Shape(b)) => {
            a.fields.len() == b.fields.len()
                && a
                    .fields
                    .iter()
                    .zip(b.fields.iter())
                    .all(|((na, va), (nb, vb))| na == nb && values_equal(va, vb))
        }
        _ => false,
    }
}

/// Hashable form of a value. Values with keys compare equal under
/// [`values_equal`] when their keys are equal, float rounding aside.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Bool(bool),
    /// Ints, addresses and integral floats, which all compare equal by value.
    Integral(u64),
    FloatBits(u64),
    Str(Rc<str>),
    Instance(u64),
    Class(String),
    Type(String),
}

impl Value<'_> {
    /// `None` for values that only compare structurally (shapes) or never
    /// compare equal (NaN, sequences, lambdas).
    pub(crate) fn hash_key(&self) -> Option<ValueKey> {
        // Bounds of the i64 range, where an integral float matches an int.
        const INT_RANGE: f64 = 9_223_372_036_854_775_808.0;
        Some(match self {
            Self::Null => ValueKey::Null,
            Self::Bool(value) => ValueKey::Bool(*value),
            Self::Int(value) => ValueKey::Integral(*value as u64),
            Self::Address(value) => ValueKey::Integral(*value),
            Self::Float(value) if value.is_nan() => return None,
            Self::Float(value) if value.fract() == 0.0 && value.abs() < INT_RANGE => {
                ValueKey::Integral(*value as i64 as u64)
            }
            Self::Float(value) if value.fract() == 0.0 => return None,
            Self::Float(value) => ValueKey::FloatBits(value.to_bits()),
            Self::Str(value) => ValueKey::Str(value.clone()),
            Self::Instance(record) => ValueKey::Instance(record.address()),
            Self::Class(record) => ValueKey::Class(record.type_of().name().to_string()),
            Self::Type(ty) => ValueKey::Type(ty.name().to_string()),
            Self::Shape(_) | Self::Seq(_) | Self::Lambda(_) => return None,
        })
    }
}

/// Values bucketed by [`values_equal`], in first-seen order.
///
/// Keys with a [`ValueKey`] are found by hash; the rest fall back to a scan
/// of the other unhashed keys.
pub(crate) struct Buckets<'h, T> {
    entries: Vec<(Value<'h>, T)>,
    hashed: HashMap<ValueKey, usize>,
    unhashed: Vec<usize>,
}

impl<'h, T> Buckets<'h, T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            hashed: HashMap::new(),
            unhashed: Vec::new(),
        }
    }

    /// The bucket for `key`, created with `init` the first time it is seen.
    pub(crate) fn entry(&mut self, key: Value<'h>, init: impl FnOnce() -> T) -> &mut T {
        let next = self.entries.len();
        let existing = match key.hash_key() {
            Some(hashed) => {
                let slot = *self.hashed.entry(hashed).or_insert(next);
                (slot != next).then_some(slot)
            }
            None => {
                let entries = &self.entries;
                let found = self
                    .unhashed
                    .iter()
                    .copied()
                    .find(|slot| values_equal(&entries[*slot].0, &key));
                if found.is_none() {
                    self.unhashed.push(next);
                }
                found
            }
        };
        let slot = match existing {
            Some(slot) => slot,
            None => {
                self.entries.push((key, init()));
                next
            }
        };
        &mut self.entries[slot].1
    }

    pub(crate) fn into_entries(self) -> Vec<(Value<'h>, T)> {
        self.entries
    }
}

/// Ordering for comparisons and sorting. Null sorts before everything.
pub(crate) fn compare_values(
    lhs: &Value<'_>,
    rhs: &Value<'_>,
    context: &str,
) -> Result<Ordering, ExecError> {
    let ordering = match (lhs, rhs) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Address(a), Value::Address(b)) => a.cmp(b),
        (Value::Address(a), Value::Int(b)) => a.cmp(&(*b as u64)),
        (Value::Int(a), Value::Address(b)) => (*a as u64).cmp(b),
        (Value::Instance(a), Value::Instance(b)) => a.address().cmp(&b.address()),
        (a, b) => {
            return Err(ExecError::mismatch(
                format!("{context} between {} and {}", a.kind_name(), b.kind_name()),
                "comparable values",
                b.kind_name(),
            ));
        }
    };
    Ok(ordering)
}

/// An ad hoc record of named values built by the query itself.
#[derive(Clone)]
pub struct ShapeRecord<'h> {
    fields: Rc<Vec<(CompactString, Value<'h>)>>,
}

impl<'h> ShapeRecord<'h> {
    pub fn new(fields: Vec<(CompactString, Value<'h>)>) -> Self {
        Self {
            fields: Rc::new(fields),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value<'h>> {
        self.fields
            .iter()
            .find(|(field, _)| field.as_str() == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> &[(CompactString, Value<'h>)] {
        &self.fields
    }
}

impl fmt::Display for ShapeRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (index, (name, value)) in self.fields.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        write!(f, " }}")
    }
}

pub type SeqItem<'h> = Result<Value<'h>, ExecError>;

/// A lazy, single-pass sequence.
///
/// Clones share one underlying enumeration: whatever one handle consumes is
/// gone for the others. Enumerating again means calling the producing
/// operation again.
#[derive(Clone)]
pub struct Sequence<'h> {
    inner: Rc<RefCell<Box<dyn Iterator<Item = SeqItem<'h>> + 'h>>>,
}

impl<'h> Sequence<'h> {
    pub fn new(iter: impl Iterator<Item = SeqItem<'h>> + 'h) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Box::new(iter))),
        }
    }

    pub fn from_values(values: Vec<Value<'h>>) -> Self {
        Self::new(values.into_iter().map(Ok))
    }
}

impl<'h> Iterator for Sequence<'h> {
    type Item = SeqItem<'h>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.try_borrow_mut() {
            Ok(mut iter) => iter.next(),
            Err(_) => Some(Err(ExecError::SequenceBusy)),
        }
    }
}
