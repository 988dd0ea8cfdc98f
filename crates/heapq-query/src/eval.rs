//! Tree-walking evaluation of a resolved query body.
//!
//! `where`, `select`, `take` and `skip` stay lazy and pull from their source
//! only when the result is enumerated. Ordering, grouping and `distinct`
//! buffer their input when called.

use std::cmp::Ordering;
use std::rc::Rc;

use compact_str::CompactString;
use heapq_snapshot::TypeDescriptor;

use crate::capabilities::HeapCapabilities;
use crate::error::ExecError;
use crate::lang::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::value::{Buckets, Sequence, ShapeRecord, Value, compare_values, values_equal};

/// Lexical scope: a chain of single bindings, newest first.
#[derive(Clone, Default)]
pub(crate) struct Env<'h> {
    head: Option<Rc<Frame<'h>>>,
}

struct Frame<'h> {
    name: CompactString,
    value: Value<'h>,
    parent: Option<Rc<Frame<'h>>>,
}

impl<'h> Env<'h> {
    fn bind(&self, name: CompactString, value: Value<'h>) -> Self {
        Self {
            head: Some(Rc::new(Frame {
                name,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value<'h>> {
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            if current.name == name {
                return Some(&current.value);
            }
            frame = current.parent.as_deref();
        }
        None
    }
}

/// A lambda together with the scope it was written in.
#[derive(Clone)]
pub struct Closure<'h> {
    param: CompactString,
    body: Rc<Expr>,
    env: Env<'h>,
}

#[derive(Clone, Copy)]
pub(crate) struct Evaluator<'h> {
    caps: HeapCapabilities<'h>,
}

impl<'h> Evaluator<'h> {
    pub(crate) fn new(caps: HeapCapabilities<'h>) -> Self {
        Self { caps }
    }

    pub(crate) fn eval(self, expr: &Expr, env: &Env<'h>) -> Result<Value<'h>, ExecError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Int(value) => Value::Int(*value),
                Literal::Float(value) => Value::Float(*value),
                Literal::Str(value) => Value::Str(value.clone()),
            }),
            ExprKind::Var(name) => env
                .lookup(name)
                .cloned()
                .ok_or_else(|| ExecError::UnboundIdentifier(name.to_string())),
            ExprKind::Call { name, args } => self.call(name, args, env),
            ExprKind::Member { target, name } => {
                let target = self.eval(target, env)?;
                member(target, name)
            }
            ExprKind::Method {
                target, name, args, ..
            } => {
                let target = self.eval(target, env)?;
                self.method(target, name, args, env)
            }
            ExprKind::Lambda { param, body } => Ok(Value::Lambda(Closure {
                param: param.clone(),
                body: body.clone(),
                env: env.clone(),
            })),
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand, env)?;
                unary(*op, operand)
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, env),
            ExprKind::Shape(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push((field.name.clone(), self.eval(&field.value, env)?));
                }
                Ok(Value::Shape(ShapeRecord::new(values)))
            }
        }
    }

    fn apply(self, closure: &Closure<'h>, arg: Value<'h>) -> Result<Value<'h>, ExecError> {
        let env = closure.env.bind(closure.param.clone(), arg);
        self.eval(&closure.body, &env)
    }

    fn call(self, name: &str, args: &[Expr], env: &Env<'h>) -> Result<Value<'h>, ExecError> {
        let caps = self.caps;
        match name {
            "allObjects" => Ok(Value::Seq(Sequence::new(
                caps.all_objects().map(|record| Ok(Value::Instance(record))),
            ))),
            "objectsOfType" => {
                let type_name = self.eval(arg(args, 0, name)?, env)?;
                let type_name = type_name.as_str("objectsOfType argument")?;
                Ok(Value::Seq(Sequence::new(
                    caps.objects_of_type(type_name)
                        .map(|record| Ok(Value::Instance(record))),
                )))
            }
            "classRecord" => {
                let type_name = self.eval(arg(args, 0, name)?, env)?;
                let record = caps.class_record(type_name.as_str("classRecord argument")?)?;
                Ok(Value::Class(record))
            }
            "allClasses" => Ok(Value::Seq(Sequence::new(
                caps.all_classes().map(|record| Ok(Value::Class(record))),
            ))),
            "objectAt" => {
                let address = self.eval(arg(args, 0, name)?, env)?;
                let record = caps.object_at(address.as_address("objectAt argument")?)?;
                Ok(Value::Instance(record))
            }
            "typeOf" => match self.eval(arg(args, 0, name)?, env)? {
                Value::Instance(record) => Ok(Value::Type(record.type_of())),
                Value::Class(record) => Ok(Value::Type(record.type_of())),
                Value::Null => Err(ExecError::NullReference {
                    field: "typeOf".into(),
                }),
                other => Err(ExecError::mismatch("typeOf argument", "record", other.kind_name())),
            },
            "addressOf" => match self.eval(arg(args, 0, name)?, env)? {
                Value::Instance(record) => Ok(Value::Address(record.address())),
                Value::Address(address) => Ok(Value::Address(address)),
                Value::Int(value) => Ok(Value::Address(value as u64)),
                Value::Null => Err(ExecError::NullReference {
                    field: "addressOf".into(),
                }),
                other => Err(ExecError::mismatch(
                    "addressOf argument",
                    "object",
                    other.kind_name(),
                )),
            },
            other => Err(ExecError::UnknownFunction(other.to_string())),
        }
    }

    fn method(
        self,
        target: Value<'h>,
        name: &str,
        args: &[Expr],
        env: &Env<'h>,
    ) -> Result<Value<'h>, ExecError> {
        match target {
            Value::Seq(sequence) => self.sequence_method(sequence, name, args, env),
            Value::Str(text) => self.string_method(&text, name, args, env),
            Value::Null => Err(ExecError::NullReference {
                field: format!("{name}()"),
            }),
            other => Err(ExecError::UnknownMethod {
                receiver: other.kind_name(),
                method: name.to_string(),
            }),
        }
    }

    fn string_method(
        self,
        text: &str,
        name: &str,
        args: &[Expr],
        env: &Env<'h>,
    ) -> Result<Value<'h>, ExecError> {
        if name == "len" {
            return Ok(Value::Int(text.chars().count() as i64));
        }
        let test: fn(&str, &str) -> bool = match name {
            "contains" => |text: &str, needle: &str| text.contains(needle),
            "startsWith" => |text: &str, needle: &str| text.starts_with(needle),
            "endsWith" => |text: &str, needle: &str| text.ends_with(needle),
            other => {
                return Err(ExecError::UnknownMethod {
                    receiver: "string",
                    method: other.to_string(),
                });
            }
        };
        let needle = self.eval(arg(args, 0, name)?, env)?;
        Ok(Value::Bool(test(text, needle.as_str(name)?)))
    }

    fn sequence_method(
        self,
        source: Sequence<'h>,
        name: &str,
        args: &[Expr],
        env: &Env<'h>,
    ) -> Result<Value<'h>, ExecError> {
        let lambda = match args.first() {
            Some(expr) if matches!(expr.kind, ExprKind::Lambda { .. }) => {
                match self.eval(expr, env)? {
                    Value::Lambda(closure) => Some(closure),
                    other => return Err(ExecError::mismatch(name, "lambda", other.kind_name())),
                }
            }
            _ => None,
        };

        match name {
            "where" => {
                let predicate = required(lambda, name)?;
                Ok(Value::Seq(Sequence::new(source.filter_map(move |item| {
                    let value = match item {
                        Ok(value) => value,
                        Err(err) => return Some(Err(err)),
                    };
                    match self
                        .apply(&predicate, value.clone())
                        .and_then(|keep| keep.as_bool("where predicate"))
                    {
                        Ok(true) => Some(Ok(value)),
                        Ok(false) => None,
                        Err(err) => Some(Err(err)),
                    }
                }))))
            }
            "select" => {
                let projection = required(lambda, name)?;
                Ok(Value::Seq(Sequence::new(source.map(move |item| {
                    item.and_then(|value| self.apply(&projection, value))
                }))))
            }
            "take" => {
                let limit = self.eval(arg(args, 0, name)?, env)?.as_count("take")?;
                Ok(Value::Seq(Sequence::new(source.take(limit))))
            }
            "skip" => {
                let offset = self.eval(arg(args, 0, name)?, env)?.as_count("skip")?;
                Ok(Value::Seq(Sequence::new(source.skip(offset))))
            }
            "orderBy" => self.order_by(source, required(lambda, name)?, false),
            "orderByDescending" => self.order_by(source, required(lambda, name)?, true),
            "groupBy" => self.group_by(source, required(lambda, name)?),
            "distinct" => {
                let mut seen = Buckets::new();
                for item in source {
                    seen.entry(item?, || ());
                }
                let values = seen.into_entries().into_iter().map(|(value, ())| value);
                Ok(Value::Seq(Sequence::from_values(values.collect())))
            }
            "count" => {
                let mut count: i64 = 0;
                for item in source {
                    if self.matches(lambda.as_ref(), item?)? {
                        count += 1;
                    }
                }
                Ok(Value::Int(count))
            }
            "any" => {
                for item in source {
                    if self.matches(lambda.as_ref(), item?)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "first" => {
                for item in source {
                    let value = item?;
                    if self.matches(lambda.as_ref(), value.clone())? {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            "sum" => {
                let mut total = Sum::Int(0);
                for item in source {
                    let value = match &lambda {
                        Some(projection) => self.apply(projection, item?)?,
                        None => item?,
                    };
                    total = total.add(value)?;
                }
                Ok(total.into_value())
            }
            other => Err(ExecError::UnknownMethod {
                receiver: "sequence",
                method: other.to_string(),
            }),
        }
    }

    fn matches(self, predicate: Option<&Closure<'h>>, value: Value<'h>) -> Result<bool, ExecError> {
        match predicate {
            Some(predicate) => self.apply(predicate, value)?.as_bool("predicate"),
            None => Ok(true),
        }
    }

    fn order_by(
        self,
        source: Sequence<'h>,
        key: Closure<'h>,
        descending: bool,
    ) -> Result<Value<'h>, ExecError> {
        let mut keyed = Vec::new();
        for item in source {
            let value = item?;
            keyed.push((self.apply(&key, value.clone())?, value));
        }

        let mut failure = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = match compare_values(a, b, "orderBy key") {
                Ok(ordering) => ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            };
            if descending { ordering.reverse() } else { ordering }
        });
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(Value::Seq(Sequence::from_values(
            keyed.into_iter().map(|(_, value)| value).collect(),
        )))
    }

    fn group_by(self, source: Sequence<'h>, key: Closure<'h>) -> Result<Value<'h>, ExecError> {
        let mut groups = Buckets::new();
        for item in source {
            let value = item?;
            let group_key = self.apply(&key, value.clone())?;
            groups.entry(group_key, Vec::new).push(value);
        }

        let shapes = groups
            .into_entries()
            .into_iter()
            .map(|(group_key, items)| {
                Value::Shape(ShapeRecord::new(vec![
                    ("key".into(), group_key),
                    ("items".into(), Value::Seq(Sequence::from_values(items))),
                ]))
            })
            .collect();
        Ok(Value::Seq(Sequence::from_values(shapes)))
    }

    fn binary(
        self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        env: &Env<'h>,
    ) -> Result<Value<'h>, ExecError> {
        // Short-circuit before the right side is evaluated.
        match op {
            BinaryOp::And => {
                if !self.eval(lhs, env)?.as_bool("&&")? {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval(rhs, env)?.as_bool("&&")?));
            }
            BinaryOp::Or => {
                if self.eval(lhs, env)?.as_bool("||")? {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval(rhs, env)?.as_bool("||")?));
            }
            _ => {}
        }

        let lhs = self.eval(lhs, env)?;
        let rhs = self.eval(rhs, env)?;
        let symbol = op.symbol();
        match op {
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
            BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            BinaryOp::Lt => Ok(Value::Bool(compare_values(&lhs, &rhs, symbol)?.is_lt())),
            BinaryOp::Le => Ok(Value::Bool(compare_values(&lhs, &rhs, symbol)?.is_le())),
            BinaryOp::Gt => Ok(Value::Bool(compare_values(&lhs, &rhs, symbol)?.is_gt())),
            BinaryOp::Ge => Ok(Value::Bool(compare_values(&lhs, &rhs, symbol)?.is_ge())),
            _ => arithmetic(op, lhs, rhs),
        }
    }
}

fn arg<'a>(args: &'a [Expr], index: usize, callee: &str) -> Result<&'a Expr, ExecError> {
    args.get(index).ok_or_else(|| {
        ExecError::mismatch(
            format!("{callee} argument {}", index + 1),
            "value",
            "nothing",
        )
    })
}

fn required<'h>(lambda: Option<Closure<'h>>, method: &str) -> Result<Closure<'h>, ExecError> {
    lambda.ok_or_else(|| ExecError::mismatch(method, "lambda", "nothing"))
}

fn member<'h>(target: Value<'h>, name: &str) -> Result<Value<'h>, ExecError> {
    match target {
        Value::Instance(record) => record.field(name),
        Value::Class(record) => record.field(name),
        Value::Shape(shape) => shape.get(name).cloned().ok_or_else(|| ExecError::FieldNotFound {
            owner: "shape".into(),
            field: name.to_string(),
        }),
        Value::Type(ty) => type_member(ty, name),
        Value::Null => Err(ExecError::NullReference {
            field: name.to_string(),
        }),
        other => Err(ExecError::mismatch(format!(".{name}"), "record", other.kind_name())),
    }
}

fn type_member<'h>(ty: &'h TypeDescriptor, name: &str) -> Result<Value<'h>, ExecError> {
    match name {
        "name" => Ok(Value::str(ty.name())),
        "fieldCount" => Ok(Value::Int(ty.fields().len() as i64)),
        "staticCount" => Ok(Value::Int(ty.statics().len() as i64)),
        "fields" => Ok(Value::Seq(Sequence::from_values(
            ty.fields()
                .iter()
                .map(|field| {
                    Value::Shape(ShapeRecord::new(vec![
                        ("name".into(), Value::str(&field.name)),
                        ("kind".into(), Value::str(field.kind.as_str())),
                    ]))
                })
                .collect(),
        ))),
        other => Err(ExecError::FieldNotFound {
            owner: format!("type {}", ty.name()),
            field: other.to_string(),
        }),
    }
}

fn unary(op: UnaryOp, operand: Value<'_>) -> Result<Value<'_>, ExecError> {
    match (op, operand) {
        (UnaryOp::Not, operand) => Ok(Value::Bool(!operand.as_bool("!")?)),
        (UnaryOp::Neg, Value::Int(value)) => value
            .checked_neg()
            .map(Value::Int)
            .ok_or(ExecError::IntegerOverflow),
        (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
        (UnaryOp::Neg, other) => Err(ExecError::mismatch("-", "number", other.kind_name())),
    }
}

fn arithmetic<'h>(op: BinaryOp, lhs: Value<'h>, rhs: Value<'h>) -> Result<Value<'h>, ExecError> {
    let symbol = op.symbol();
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(ExecError::DivisionByZero),
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Rem => a.checked_rem(b),
                _ => return Err(ExecError::mismatch(symbol, "bool", "int")),
            };
            result.map(Value::Int).ok_or(ExecError::IntegerOverflow)
        }
        (Value::Int(a), Value::Float(b)) => float_op(op, a as f64, b),
        (Value::Float(a), Value::Int(b)) => float_op(op, a, b as f64),
        (Value::Float(a), Value::Float(b)) => float_op(op, a, b),
        (Value::Address(address), Value::Int(offset)) => {
            let result = match op {
                BinaryOp::Add => address.checked_add_signed(offset),
                BinaryOp::Sub => offset
                    .checked_neg()
                    .and_then(|negated| address.checked_add_signed(negated)),
                _ => return Err(ExecError::mismatch(symbol, "int", "address")),
            };
            result.map(Value::Address).ok_or(ExecError::IntegerOverflow)
        }
        (Value::Address(a), Value::Address(b)) if op == BinaryOp::Sub => {
            i64::try_from(a as i128 - b as i128)
                .map(Value::Int)
                .map_err(|_| ExecError::IntegerOverflow)
        }
        (lhs @ Value::Str(_), rhs) | (lhs, rhs @ Value::Str(_)) if op == BinaryOp::Add => {
            Ok(Value::str(&format!("{lhs}{rhs}")))
        }
        (lhs, rhs) => Err(ExecError::mismatch(
            format!("{} {symbol} {}", lhs.kind_name(), rhs.kind_name()),
            "numbers",
            rhs.kind_name(),
        )),
    }
}

fn float_op<'h>(op: BinaryOp, a: f64, b: f64) -> Result<Value<'h>, ExecError> {
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(ExecError::mismatch(op.symbol(), "bool", "float")),
    }))
}

enum Sum {
    Int(i64),
    Float(f64),
}

impl Sum {
    fn add(self, value: Value<'_>) -> Result<Self, ExecError> {
        Ok(match (self, value) {
            (total, Value::Null) => total,
            (Self::Int(total), Value::Int(value)) => {
                Self::Int(total.checked_add(value).ok_or(ExecError::IntegerOverflow)?)
            }
            (Self::Int(total), Value::Float(value)) => Self::Float(total as f64 + value),
            (Self::Float(total), Value::Int(value)) => Self::Float(total + value as f64),
            (Self::Float(total), Value::Float(value)) => Self::Float(total + value),
            (_, other) => return Err(ExecError::mismatch("sum", "number", other.kind_name())),
        })
    }

    fn into_value<'h>(self) -> Value<'h> {
        match self {
            Self::Int(total) => Value::Int(total),
            Self::Float(total) => Value::Float(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use heapq_snapshot::{FieldDescriptor, FieldKind, FieldValue, MemorySnapshot, StaticField};

    use super::*;
    use crate::lang::lexer::lex;
    use crate::lang::parser::parse_expr;

    fn heap() -> MemorySnapshot {
        MemorySnapshot::builder()
            .with_type(
                TypeDescriptor::new(
                    "Foo",
                    vec![
                        FieldDescriptor::new("Bar", FieldKind::Int),
                        FieldDescriptor::new("Name", FieldKind::String),
                        FieldDescriptor::new("Next", FieldKind::Reference),
                    ],
                    vec![StaticField::new("Instances", FieldKind::Int, FieldValue::Int(3))],
                )
                .expect("valid type"),
            )
            .with_type(
                TypeDescriptor::new(
                    "Baz",
                    vec![FieldDescriptor::new("Weight", FieldKind::Float)],
                    vec![],
                )
                .expect("valid type"),
            )
            .with_object(
                0x1000,
                "Foo",
                vec![FieldValue::Int(3), FieldValue::Str("alpha".into()), FieldValue::Ref(0x1020)],
            )
            .with_object(0x1010, "Baz", vec![FieldValue::Float(0.5)])
            .with_object(
                0x1020,
                "Foo",
                vec![FieldValue::Int(1), FieldValue::Str("beta".into()), FieldValue::Null],
            )
            .with_object(
                0x1030,
                "Foo",
                vec![FieldValue::Int(2), FieldValue::Str("alphabet".into()), FieldValue::Null],
            )
            .build()
            .expect("valid snapshot")
    }

    fn eval<'h>(heap: &'h MemorySnapshot, source: &str) -> Result<Value<'h>, ExecError> {
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty(), "lex errors in {source:?}");
        let expr = parse_expr(&tokens).expect("parses");
        Evaluator::new(HeapCapabilities::new(heap)).eval(&expr, &Env::default())
    }

    fn texts(heap: &MemorySnapshot, source: &str) -> Vec<String> {
        eval(heap, source)
            .expect("evaluates")
            .into_seq("test")
            .expect("sequence")
            .map(|item| item.expect("item").to_string())
            .collect()
    }

    #[test]
    fn filter_project_and_order() {
        let heap = heap();
        assert_eq!(
            texts(
                &heap,
                "objectsOfType(\"Foo\").where(o => o.Bar > 1)\
                 .orderBy(o => o.Bar).select(o => o.Name)"
            ),
            vec!["alphabet", "alpha"]
        );
        assert_eq!(
            texts(&heap, "objectsOfType(\"Foo\").orderByDescending(o => o.Bar).select(o => o.Bar)"),
            vec!["3", "2", "1"]
        );
    }

    #[test]
    fn aggregates() {
        let heap = heap();
        assert!(matches!(eval(&heap, "allObjects().count()"), Ok(Value::Int(4))));
        assert!(matches!(
            eval(&heap, "objectsOfType(\"Foo\").sum(o => o.Bar)"),
            Ok(Value::Int(6))
        ));
        assert!(matches!(
            eval(&heap, "allObjects().any(o => typeOf(o).name == \"Baz\")"),
            Ok(Value::Bool(true))
        ));
        assert!(matches!(
            eval(&heap, "objectsOfType(\"Nope\").first()"),
            Ok(Value::Null)
        ));
        assert!(matches!(
            eval(&heap, "objectsOfType(\"Foo\").count(o => o.Name.startsWith(\"alpha\"))"),
            Ok(Value::Int(2))
        ));
    }

    #[test]
    fn group_by_keeps_first_seen_order() {
        let heap = heap();
        assert_eq!(
            texts(
                &heap,
                "allObjects().groupBy(o => typeOf(o).name)\
                 .select(g => { type: g.key, n: g.items.count() })"
            ),
            vec!["{ type = Foo, n = 3 }", "{ type = Baz, n = 1 }"]
        );
    }

    #[test]
    fn take_skip_and_distinct() {
        let heap = heap();
        assert_eq!(
            texts(&heap, "allObjects().skip(1).take(2).select(o => addressOf(o))"),
            vec!["0x0000000000001010", "0x0000000000001020"]
        );
        assert_eq!(
            texts(&heap, "allObjects().select(o => typeOf(o).name).distinct()"),
            vec!["Foo", "Baz"]
        );
    }

    #[test]
    fn negative_counts_are_rejected() {
        let heap = heap();
        assert!(matches!(
            eval(&heap, "allObjects().take(-1)"),
            Err(ExecError::TypeMismatch { expected: "non-negative int", .. })
        ));
        assert!(matches!(
            eval(&heap, "allObjects().skip(0 - 2)"),
            Err(ExecError::TypeMismatch { found: "negative int", .. })
        ));
    }

    #[test]
    fn distinct_and_group_by_compare_shapes_by_value() {
        let heap = heap();
        assert_eq!(
            texts(
                &heap,
                "allObjects().select(o => { t: typeOf(o).name }).distinct().select(s => s.t)"
            ),
            vec!["Foo", "Baz"]
        );
        assert_eq!(
            texts(
                &heap,
                "allObjects().groupBy(o => { t: typeOf(o).name }).select(g => g.items.count())"
            ),
            vec!["3", "1"]
        );
    }

    #[test]
    fn references_and_statics() {
        let heap = heap();
        assert!(matches!(
            eval(&heap, "objectAt(0x1000).Next.Bar"),
            Ok(Value::Int(1))
        ));
        assert!(matches!(
            eval(&heap, "classRecord(\"Foo\").Instances"),
            Ok(Value::Int(3))
        ));
        assert_eq!(
            eval(&heap, "objectAt(0x1020).Next.Bar").err(),
            Some(ExecError::NullReference { field: "Bar".into() })
        );
        assert_eq!(
            texts(&heap, "typeOf(classRecord(\"Foo\")).fields"),
            vec![
                "{ name = Bar, kind = int }",
                "{ name = Name, kind = string }",
                "{ name = Next, kind = reference }",
            ]
        );
    }

    #[test]
    fn lazy_stages_fault_when_pulled() {
        let heap = heap();
        // Building the pipeline succeeds; reading a missing field fails on the first pull.
        let value = eval(&heap, "allObjects().select(o => o.Missing)").expect("lazy");
        let mut items = value.into_seq("test").expect("sequence");
        assert!(matches!(
            items.next(),
            Some(Err(ExecError::FieldNotFound { .. }))
        ));
    }

    #[test]
    fn lambdas_capture_their_scope() {
        let heap = heap();
        assert_eq!(
            texts(
                &heap,
                "objectsOfType(\"Foo\")\
                 .select(o => objectsOfType(\"Foo\").count(p => p.Bar < o.Bar))"
            ),
            vec!["2", "0", "1"]
        );
    }

    #[test]
    fn arithmetic_faults() {
        let heap = heap();
        assert_eq!(eval(&heap, "1 / 0").err(), Some(ExecError::DivisionByZero));
        assert_eq!(eval(&heap, "5 % 0").err(), Some(ExecError::DivisionByZero));
        assert_eq!(
            eval(&heap, "9223372036854775807 + 1").err(),
            Some(ExecError::IntegerOverflow)
        );
        assert!(matches!(eval(&heap, "7 / 2"), Ok(Value::Int(3))));
        assert!(matches!(eval(&heap, "1 + 0.5"), Ok(Value::Float(v)) if v == 1.5));
        assert_eq!(eval(&heap, "\"n=\" + 1").expect("concat").to_string(), "n=1");
        assert!(matches!(
            eval(&heap, "1 + true"),
            Err(ExecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn short_circuit_skips_the_right_side() {
        let heap = heap();
        assert!(matches!(eval(&heap, "false && 1 / 0 == 0"), Ok(Value::Bool(false))));
        assert!(matches!(eval(&heap, "true || 1 / 0 == 0"), Ok(Value::Bool(true))));
    }

    #[test]
    fn address_arithmetic() {
        let heap = heap();
        assert!(matches!(
            eval(&heap, "addressOf(objectAt(0x1000)) + 0x20"),
            Ok(Value::Address(0x1020))
        ));
        assert!(matches!(
            eval(&heap, "addressOf(0x1030) - addressOf(0x1000)"),
            Ok(Value::Int(0x30))
        ));
    }

    #[test]
    fn methods_on_the_wrong_receiver() {
        let heap = heap();
        assert_eq!(
            eval(&heap, "objectAt(0x1000).count()").err(),
            Some(ExecError::UnknownMethod {
                receiver: "object",
                method: "count".into()
            })
        );
        assert!(matches!(
            eval(&heap, "allObjects().where(o => o.Bar)")
                .map(|v| v.into_seq("t").map(|mut s| s.next())),
            Ok(Ok(Some(Err(ExecError::TypeMismatch { .. }))))
        ));
    }
}
