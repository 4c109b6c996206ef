use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use ovb_core::error::codes;
use ovb_core::stmt::{BinOp, Literal, UnaryOp};
use ovb_core::{RuntimeError, TypeTag};

use super::objects::ModuleInstance;

/// One storage cell. By-reference parameters alias the caller's slot; every
/// other binding gets a fresh one.
pub type Slot = Arc<Mutex<Value>>;

pub fn new_slot(value: Value) -> Slot {
    Arc::new(Mutex::new(value))
}

/// A variant-like value: the declared type tag travels separately from the
/// runtime representation, so a variant-declared value may hold any kind.
#[derive(Debug, Clone)]
pub struct Value {
    pub declared: TypeTag,
    pub repr: Repr,
}

#[derive(Debug, Clone)]
pub enum Repr {
    Empty,
    Null,
    Bool(bool),
    Integer(i16),
    Long(i32),
    Single(f32),
    Double(f64),
    Currency(Decimal),
    Date(NaiveDateTime),
    Text(String),
    Object(Arc<ModuleInstance>),
    Nothing,
    Array(Vec<Value>),
    ErrorCode(u32),
    /// Placeholder bound for an omitted optional argument.
    Missing,
}

impl Value {
    fn of(declared: TypeTag, repr: Repr) -> Self {
        Self { declared, repr }
    }

    pub fn empty() -> Self {
        Self::of(TypeTag::Variant, Repr::Empty)
    }

    pub fn null() -> Self {
        Self::of(TypeTag::Variant, Repr::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::of(TypeTag::Boolean, Repr::Bool(value))
    }

    pub fn integer(value: i16) -> Self {
        Self::of(TypeTag::Integer, Repr::Integer(value))
    }

    pub fn long(value: i32) -> Self {
        Self::of(TypeTag::Long, Repr::Long(value))
    }

    pub fn single(value: f32) -> Self {
        Self::of(TypeTag::Single, Repr::Single(value))
    }

    pub fn double(value: f64) -> Self {
        Self::of(TypeTag::Double, Repr::Double(value))
    }

    pub fn currency(value: Decimal) -> Self {
        Self::of(TypeTag::Currency, Repr::Currency(value))
    }

    pub fn date(value: NaiveDateTime) -> Self {
        Self::of(TypeTag::Date, Repr::Date(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::of(TypeTag::String, Repr::Text(value.into()))
    }

    pub fn object(instance: Arc<ModuleInstance>) -> Self {
        Self::of(TypeTag::Object, Repr::Object(instance))
    }

    pub fn nothing() -> Self {
        Self::of(TypeTag::Object, Repr::Nothing)
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::of(TypeTag::Array, Repr::Array(items))
    }

    pub fn error_code(code: u32) -> Self {
        Self::of(TypeTag::Error, Repr::ErrorCode(code))
    }

    pub fn missing() -> Self {
        Self::of(TypeTag::Variant, Repr::Missing)
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Empty => Self::empty(),
            Literal::Null => Self::null(),
            Literal::Nothing => Self::nothing(),
            Literal::Bool(v) => Self::bool(*v),
            Literal::Integer(v) => Self::integer(*v),
            Literal::Long(v) => Self::long(*v),
            Literal::Single(v) => Self::single(*v),
            Literal::Double(v) => Self::double(*v),
            Literal::Currency(v) => Self::currency(*v),
            Literal::Date(v) => Self::date(*v),
            Literal::Str(v) => Self::text(v.clone()),
            Literal::ErrorCode(v) => Self::error_code(*v),
        }
    }

    /// Initial content for a storage cell of the given declared type.
    pub fn default_for(tag: TypeTag) -> Self {
        let repr = match tag {
            TypeTag::Boolean => Repr::Bool(false),
            TypeTag::Integer => Repr::Integer(0),
            TypeTag::Long => Repr::Long(0),
            TypeTag::Single => Repr::Single(0.0),
            TypeTag::Double => Repr::Double(0.0),
            TypeTag::Currency => Repr::Currency(Decimal::ZERO),
            TypeTag::Date => Repr::Date(epoch()),
            TypeTag::String => Repr::Text(String::new()),
            TypeTag::Object => Repr::Nothing,
            TypeTag::Array => Repr::Array(Vec::new()),
            TypeTag::Null => Repr::Null,
            TypeTag::Error => Repr::ErrorCode(0),
            TypeTag::Empty | TypeTag::Variant => Repr::Empty,
        };
        Self::of(tag, repr)
    }

    pub fn runtime_tag(&self) -> TypeTag {
        match &self.repr {
            Repr::Empty => TypeTag::Empty,
            Repr::Null => TypeTag::Null,
            Repr::Bool(_) => TypeTag::Boolean,
            Repr::Integer(_) => TypeTag::Integer,
            Repr::Long(_) => TypeTag::Long,
            Repr::Single(_) => TypeTag::Single,
            Repr::Double(_) => TypeTag::Double,
            Repr::Currency(_) => TypeTag::Currency,
            Repr::Date(_) => TypeTag::Date,
            Repr::Text(_) => TypeTag::String,
            Repr::Object(_) | Repr::Nothing => TypeTag::Object,
            Repr::Array(_) => TypeTag::Array,
            Repr::ErrorCode(_) => TypeTag::Error,
            Repr::Missing => TypeTag::Variant,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.repr, Repr::Missing)
    }

    pub fn is_object(&self) -> bool {
        matches!(self.repr, Repr::Object(_) | Repr::Nothing)
    }

    pub fn as_instance(&self) -> Option<&Arc<ModuleInstance>> {
        match &self.repr {
            Repr::Object(instance) => Some(instance),
            _ => None,
        }
    }
}

/// Day zero of the legacy date representation.
fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .map(|d| d.and_hms_opt(0, 0, 0))
        .flatten()
        .unwrap_or_default()
}

fn date_to_f64(date: NaiveDateTime) -> f64 {
    let delta = date - epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}

fn f64_to_date(days: f64) -> NaiveDateTime {
    epoch() + Duration::milliseconds((days * 86_400_000.0).round() as i64)
}

fn type_mismatch() -> RuntimeError {
    RuntimeError::new(codes::TYPE_MISMATCH)
}

fn overflow() -> RuntimeError {
    RuntimeError::new(codes::OVERFLOW)
}

fn null_misuse() -> RuntimeError {
    RuntimeError::new(codes::INVALID_USE_OF_NULL)
}

/// Converts a value to the target kind following the fixed promotion rules:
/// numeric widening, checked narrowing, string parsing, date arithmetic.
pub fn cast(value: &Value, target: TypeTag) -> Result<Value, RuntimeError> {
    if target == TypeTag::Variant {
        let mut out = value.clone();
        out.declared = TypeTag::Variant;
        return Ok(out);
    }
    if value.runtime_tag() == target {
        let mut out = value.clone();
        out.declared = target;
        return Ok(out);
    }
    match &value.repr {
        Repr::Missing => Err(type_mismatch()),
        Repr::Null => Err(null_misuse()),
        Repr::Empty => Ok(Value::default_for(target)),
        Repr::Object(_) | Repr::Nothing => Err(type_mismatch()),
        Repr::Array(_) => Err(type_mismatch()),
        Repr::ErrorCode(code) => match target {
            TypeTag::Long => Ok(Value::long(*code as i32)),
            _ => Err(type_mismatch()),
        },
        Repr::Text(text) => cast_text(text, target),
        Repr::Bool(flag) => {
            // Numeric True is -1 in the legacy model.
            let numeric = if *flag { -1.0 } else { 0.0 };
            cast_numeric(numeric, target)
        }
        Repr::Integer(v) => cast_numeric(f64::from(*v), target),
        Repr::Long(v) => cast_numeric(f64::from(*v), target),
        Repr::Single(v) => cast_numeric(f64::from(*v), target),
        Repr::Double(v) => cast_numeric(*v, target),
        Repr::Currency(v) => {
            let double = v.to_f64().ok_or_else(overflow)?;
            cast_numeric(double, target)
        }
        Repr::Date(v) => cast_numeric(date_to_f64(*v), target),
    }
}

fn cast_numeric(value: f64, target: TypeTag) -> Result<Value, RuntimeError> {
    match target {
        TypeTag::Boolean => Ok(Value::bool(value != 0.0)),
        TypeTag::Integer => {
            let rounded = value.round();
            if rounded < f64::from(i16::MIN) || rounded > f64::from(i16::MAX) {
                Err(overflow())
            } else {
                Ok(Value::integer(rounded as i16))
            }
        }
        TypeTag::Long => {
            let rounded = value.round();
            if rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
                Err(overflow())
            } else {
                Ok(Value::long(rounded as i32))
            }
        }
        TypeTag::Single => {
            if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                Err(overflow())
            } else {
                Ok(Value::single(value as f32))
            }
        }
        TypeTag::Double => Ok(Value::double(value)),
        TypeTag::Currency => Decimal::from_f64(value)
            .map(Value::currency)
            .ok_or_else(overflow),
        TypeTag::Date => Ok(Value::date(f64_to_date(value))),
        TypeTag::String => Ok(Value::text(format_f64(value))),
        _ => Err(type_mismatch()),
    }
}

fn cast_text(text: &str, target: TypeTag) -> Result<Value, RuntimeError> {
    match target {
        TypeTag::String => Ok(Value::text(text.to_string())),
        TypeTag::Date => parse_date(text).map(Value::date).ok_or_else(type_mismatch),
        TypeTag::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::bool(true)),
            "false" => Ok(Value::bool(false)),
            other => other
                .parse::<f64>()
                .map(|v| Value::bool(v != 0.0))
                .map_err(|_| type_mismatch()),
        },
        _ => {
            let parsed: f64 = text.trim().parse().map_err(|_| type_mismatch())?;
            cast_numeric(parsed, target)
        }
    }
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn format_f64(value: f64) -> String {
    if value == value.trunc() && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn to_f64(value: &Value) -> Result<f64, RuntimeError> {
    match &value.repr {
        Repr::Bool(flag) => Ok(if *flag { -1.0 } else { 0.0 }),
        Repr::Integer(v) => Ok(f64::from(*v)),
        Repr::Long(v) => Ok(f64::from(*v)),
        Repr::Single(v) => Ok(f64::from(*v)),
        Repr::Double(v) => Ok(*v),
        Repr::Currency(v) => v.to_f64().ok_or_else(overflow),
        Repr::Date(v) => Ok(date_to_f64(*v)),
        Repr::Empty => Ok(0.0),
        Repr::Text(text) => text.trim().parse().map_err(|_| type_mismatch()),
        Repr::Null => Err(null_misuse()),
        _ => Err(type_mismatch()),
    }
}

/// Numeric promotion rank; binary arithmetic produces the higher-ranked kind.
fn rank(tag: TypeTag) -> Option<u8> {
    match tag {
        TypeTag::Boolean => Some(0),
        TypeTag::Integer => Some(1),
        TypeTag::Long => Some(2),
        TypeTag::Currency => Some(3),
        TypeTag::Single => Some(4),
        TypeTag::Double | TypeTag::Date => Some(5),
        TypeTag::Empty => Some(1),
        _ => None,
    }
}

fn is_text(value: &Value) -> bool {
    matches!(value.repr, Repr::Text(_))
}

/// Coerces to a branch condition. Null is not a valid condition.
pub fn as_condition(value: &Value) -> Result<bool, RuntimeError> {
    match cast(value, TypeTag::Boolean)?.repr {
        Repr::Bool(flag) => Ok(flag),
        _ => Err(type_mismatch()),
    }
}

pub fn eval_unary(op: UnaryOp, value: &Value) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Neg => {
            let v = to_f64(value)?;
            numeric_result(-v, value.runtime_tag(), value.runtime_tag())
        }
        UnaryOp::Not => Ok(Value::bool(!as_condition(value)?)),
    }
}

pub fn eval_binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Concat => {
            let l = cast(left, TypeTag::String)?;
            let r = cast(right, TypeTag::String)?;
            match (l.repr, r.repr) {
                (Repr::Text(a), Repr::Text(b)) => Ok(Value::text(a + &b)),
                _ => Err(type_mismatch()),
            }
        }
        BinOp::Add if is_text(left) && is_text(right) => {
            eval_binary(BinOp::Concat, left, right)
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            arithmetic(op, left, right)
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(left, right)?;
            let result = match op {
                BinOp::Eq => ordering == Ordering::Equal,
                BinOp::Ne => ordering != Ordering::Equal,
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::bool(result))
        }
        BinOp::And => Ok(Value::bool(as_condition(left)? && as_condition(right)?)),
        BinOp::Or => Ok(Value::bool(as_condition(left)? || as_condition(right)?)),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    if matches!(left.repr, Repr::Null) || matches!(right.repr, Repr::Null) {
        return Err(null_misuse());
    }
    // Currency operands stay in exact fixed point; Div still widens to
    // Double and Mod truncates, so both fall through.
    if let (Repr::Currency(a), Repr::Currency(b)) = (&left.repr, &right.repr) {
        let exact = match op {
            BinOp::Add => Some(a.checked_add(*b)),
            BinOp::Sub => Some(a.checked_sub(*b)),
            BinOp::Mul => Some(a.checked_mul(*b)),
            _ => None,
        };
        if let Some(result) = exact {
            return result.map(Value::currency).ok_or_else(overflow);
        }
    }
    let l = to_f64(left)?;
    let r = to_f64(right)?;
    let result = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r == 0.0 {
                return Err(RuntimeError::new(codes::DIVISION_BY_ZERO));
            }
            l / r
        }
        BinOp::Mod => {
            if r == 0.0 {
                return Err(RuntimeError::new(codes::DIVISION_BY_ZERO));
            }
            (l as i64 % r as i64) as f64
        }
        _ => unreachable!("non-arithmetic operator"),
    };
    if op == BinOp::Div {
        // True division always widens to Double.
        return Ok(Value::double(result));
    }
    numeric_result(result, left.runtime_tag(), right.runtime_tag())
}

/// Narrows an f64 result back to the wider of the two operand kinds, with
/// overflow checks on the way down. Division always widens to Double.
fn numeric_result(value: f64, left: TypeTag, right: TypeTag) -> Result<Value, RuntimeError> {
    let (lr, rr) = match (rank(left), rank(right)) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            // Text operands participate through parsing and produce Double.
            return Ok(Value::double(value));
        }
    };
    let target = match lr.max(rr) {
        0 | 1 => TypeTag::Integer,
        2 => TypeTag::Long,
        3 => TypeTag::Currency,
        4 => TypeTag::Single,
        _ => TypeTag::Double,
    };
    cast_numeric(value, target)
}

/// Kind-ranked comparison: the weaker side is coerced before comparing.
/// Object operands never compare; Null never compares.
pub fn compare(left: &Value, right: &Value) -> Result<Ordering, RuntimeError> {
    if left.is_object() || right.is_object() {
        return Err(type_mismatch());
    }
    if matches!(left.repr, Repr::Null) || matches!(right.repr, Repr::Null) {
        return Err(null_misuse());
    }
    if let (Repr::Text(a), Repr::Text(b)) = (&left.repr, &right.repr) {
        return Ok(a.as_str().cmp(b.as_str()));
    }
    let l = to_f64(left)?;
    let r = to_f64(right)?;
    l.partial_cmp(&r).ok_or_else(type_mismatch)
}

/// Semantic equality: scalar kinds compare by value, objects by identity.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (&left.repr, &right.repr) {
        (Repr::Object(a), Repr::Object(b)) => Arc::ptr_eq(a, b),
        (Repr::Nothing, Repr::Nothing) => true,
        (Repr::Null, Repr::Null) => true,
        (Repr::Empty, Repr::Empty) => true,
        (Repr::Missing, Repr::Missing) => true,
        (Repr::Text(a), Repr::Text(b)) => a == b,
        (Repr::Array(a), Repr::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Repr::ErrorCode(a), Repr::ErrorCode(b)) => a == b,
        _ => compare(left, right).map(|o| o == Ordering::Equal).unwrap_or(false),
    }
}

pub fn format_value(value: &Value) -> String {
    match &value.repr {
        Repr::Empty => String::new(),
        Repr::Null => "Null".to_string(),
        Repr::Bool(v) => if *v { "True" } else { "False" }.to_string(),
        Repr::Integer(v) => v.to_string(),
        Repr::Long(v) => v.to_string(),
        Repr::Single(v) => v.to_string(),
        Repr::Double(v) => format_f64(*v),
        Repr::Currency(v) => v.to_string(),
        Repr::Date(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
        Repr::Text(v) => v.clone(),
        Repr::Object(instance) => format!("(Instance {})", instance.module_name()),
        Repr::Nothing => "Nothing".to_string(),
        Repr::Array(items) => format!("Array({})", items.len()),
        Repr::ErrorCode(code) => format!("Error {code}"),
        Repr::Missing => "Missing".to_string(),
    }
}

/// JSON rendering for debugger snapshots; objects render as opaque labels.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match &value.repr {
        Repr::Bool(v) => serde_json::Value::Bool(*v),
        Repr::Integer(v) => serde_json::Value::Number((*v).into()),
        Repr::Long(v) => serde_json::Value::Number((*v).into()),
        Repr::Double(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Repr::Single(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Repr::Array(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Repr::Null => serde_json::Value::Null,
        _ => serde_json::Value::String(format_value(value)),
    }
}
