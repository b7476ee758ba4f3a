//! Conversions between Rust values and value-stack slots.
//!
//! Reads never hand out pointers into runtime memory: strings come back as
//! `Rc<[u8]>` clones that stay valid however the stack changes afterwards.

use std::rc::Rc;

use memory::{ForeignRef, Kind, Value};

use crate::error::RuntimeError;
use crate::machine::Runtime;

/// Reference-counted string contents.
pub type ByteStr = Rc<[u8]>;

/// A stack slot read under an expected kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Typed {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(ByteStr),
    Table(Value),
    Function(Value),
    Foreign(ForeignRef),
    Thread(Value),
}

impl Typed {
    pub fn kind(&self) -> Kind {
        match self {
            Typed::Nil => Kind::Nil,
            Typed::Bool(_) => Kind::Boolean,
            Typed::Int(_) => Kind::Integer,
            Typed::Float(_) => Kind::Float,
            Typed::Str(_) => Kind::String,
            Typed::Table(_) => Kind::Table,
            Typed::Function(_) => Kind::Function,
            Typed::Foreign(_) => Kind::Foreign,
            Typed::Thread(_) => Kind::Thread,
        }
    }
}

/// Anything that can be pushed onto the value stack.
pub trait IntoStack {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError>;
}

/// Anything that can be read from a stack index.
pub trait FromStack: Sized {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError>;
}

// --- Coercions ---

/// Float to integer only when exact.
pub fn float_to_int(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a numeric string: decimal or `0x` hex integers, then decimal
/// floats. `inf` and `nan` spellings are not numbers.
pub fn parse_number(bytes: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        // from_str_radix would also take a sign here.
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let magnitude = u64::from_str_radix(hex, 16).ok()? as i64;
        return Some(Value::int(if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        }));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::int(i));
    }
    if digits
        .bytes()
        .any(|b| b.is_ascii_alphabetic() && !matches!(b, b'e' | b'E'))
    {
        return None;
    }
    text.parse::<f64>().ok().map(Value::float)
}

/// Number formatting used for number-to-string coercion.
pub fn format_number(value: Value) -> Option<String> {
    match value {
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) if f.is_nan() => Some(if f.is_sign_negative() { "-nan" } else { "nan" }.into()),
        Value::Float(f) if f.is_infinite() => Some(if f > 0.0 { "inf" } else { "-inf" }.into()),
        Value::Float(f) => Some(format_float(f)),
        _ => None,
    }
}

/// `%.14g`, with `.0` appended when the result would read back as an
/// integer.
fn format_float(f: f64) -> String {
    let sci = format!("{:.13e}", f);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut out = if (-4..14).contains(&exp) {
        trim_fraction(&format!("{:.*}", (13 - exp) as usize, f)).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.unsigned_abs())
    };
    if out.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        out.push_str(".0");
    }
    out
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn mismatch(expected: Kind, actual: Value, index: i32) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected,
        actual: actual.kind(),
        index,
    }
}

impl Runtime {
    /// Read `index` as `expected`, applying the standard coercions.
    /// A missing slot reads as nil.
    pub fn read(&self, index: i32, expected: Kind) -> Result<Typed, RuntimeError> {
        let value = self.value_at(index);
        match expected {
            Kind::Nil => match value {
                Value::Nil => Ok(Typed::Nil),
                other => Err(mismatch(expected, other, index)),
            },
            Kind::Boolean => match value {
                Value::Bool(b) => Ok(Typed::Bool(b)),
                other => Err(mismatch(expected, other, index)),
            },
            Kind::Integer => self.check_integer(index).map(Typed::Int),
            Kind::Float => self.check_number(index).map(Typed::Float),
            Kind::String => self.check_bytes(index).map(Typed::Str),
            Kind::Table => match value {
                Value::Table(_) => Ok(Typed::Table(value)),
                other => Err(mismatch(expected, other, index)),
            },
            Kind::Function => match value {
                Value::Function(_) => Ok(Typed::Function(value)),
                other => Err(mismatch(expected, other, index)),
            },
            Kind::Foreign => match value {
                Value::Foreign(r) => Ok(Typed::Foreign(r)),
                other => Err(mismatch(expected, other, index)),
            },
            Kind::Thread => match value {
                Value::Thread(_) => Ok(Typed::Thread(value)),
                other => Err(mismatch(expected, other, index)),
            },
        }
    }

    /// `None` for a nil or missing slot, otherwise `read`.
    pub fn read_optional(&self, index: i32, expected: Kind) -> Result<Option<Typed>, RuntimeError> {
        if self.value_at(index).is_nil() {
            return Ok(None);
        }
        self.read(index, expected).map(Some)
    }

    pub fn check_integer(&self, index: i32) -> Result<i64, RuntimeError> {
        let value = self.value_at(index);
        let number = match value {
            Value::Int(i) => return Ok(i),
            Value::Float(_) => value,
            Value::String(_) => self
                .string_bytes(value)
                .and_then(|s| parse_number(&s))
                .ok_or_else(|| mismatch(Kind::Integer, value, index))?,
            other => return Err(mismatch(Kind::Integer, other, index)),
        };
        match number {
            Value::Int(i) => Ok(i),
            Value::Float(f) => float_to_int(f).ok_or_else(|| RuntimeError::Coercion {
                index,
                reason: "number has no integer representation".to_string(),
            }),
            other => Err(mismatch(Kind::Integer, other, index)),
        }
    }

    pub fn check_number(&self, index: i32) -> Result<f64, RuntimeError> {
        let value = self.value_at(index);
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::String(_) => match self.string_bytes(value).and_then(|s| parse_number(&s)) {
                Some(Value::Int(i)) => Ok(i as f64),
                Some(Value::Float(f)) => Ok(f),
                _ => Err(mismatch(Kind::Float, value, index)),
            },
            other => Err(mismatch(Kind::Float, other, index)),
        }
    }

    /// String contents; numbers are formatted into a fresh string.
    pub fn check_bytes(&self, index: i32) -> Result<ByteStr, RuntimeError> {
        let value = self.value_at(index);
        match value {
            Value::String(_) => self
                .string_bytes(value)
                .ok_or_else(|| mismatch(Kind::String, value, index)),
            Value::Int(_) | Value::Float(_) => format_number(value)
                .map(|s| Rc::from(s.into_bytes()))
                .ok_or_else(|| mismatch(Kind::String, value, index)),
            other => Err(mismatch(Kind::String, other, index)),
        }
    }

    /// UTF-8 string argument.
    pub fn check_str(&self, index: i32) -> Result<String, RuntimeError> {
        let bytes = self.check_bytes(index)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| RuntimeError::Coercion {
            index,
            reason: "string is not valid UTF-8".to_string(),
        })
    }

    pub fn check_bool(&self, index: i32) -> Result<bool, RuntimeError> {
        match self.value_at(index) {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(Kind::Boolean, other, index)),
        }
    }

    pub fn check_table(&self, index: i32) -> Result<Value, RuntimeError> {
        match self.value_at(index) {
            v @ Value::Table(_) => Ok(v),
            other => Err(mismatch(Kind::Table, other, index)),
        }
    }

    pub fn opt_integer(&self, index: i32, default: i64) -> Result<i64, RuntimeError> {
        if self.value_at(index).is_nil() {
            Ok(default)
        } else {
            self.check_integer(index)
        }
    }
}

// --- IntoStack ---

impl IntoStack for Value {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        rt.push_value(self)
    }
}

impl IntoStack for () {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        rt.push_value(Value::Nil)
    }
}

impl IntoStack for bool {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        rt.push_value(Value::bool(self))
    }
}

impl IntoStack for i64 {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        rt.push_value(Value::int(self))
    }
}

impl IntoStack for i32 {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        rt.push_value(Value::int(i64::from(self)))
    }
}

impl IntoStack for usize {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        match i64::try_from(self) {
            Ok(i) => rt.push_value(Value::int(i)),
            Err(_) => rt.push_value(Value::float(self as f64)),
        }
    }
}

impl IntoStack for f64 {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        rt.push_value(Value::float(self))
    }
}

impl IntoStack for &[u8] {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        let s = rt.new_string(self)?;
        rt.push_value(s)
    }
}

impl IntoStack for &str {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        self.as_bytes().push_to(rt)
    }
}

impl IntoStack for String {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        self.as_bytes().push_to(rt)
    }
}

impl IntoStack for ByteStr {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        (&*self).push_to(rt)
    }
}

impl<T: IntoStack> IntoStack for Option<T> {
    fn push_to(self, rt: &mut Runtime) -> Result<(), RuntimeError> {
        match self {
            Some(v) => v.push_to(rt),
            None => rt.push_value(Value::Nil),
        }
    }
}

// --- FromStack ---

impl FromStack for Value {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        Ok(rt.value_at(index))
    }
}

impl FromStack for bool {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        rt.check_bool(index)
    }
}

impl FromStack for i64 {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        rt.check_integer(index)
    }
}

impl FromStack for f64 {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        rt.check_number(index)
    }
}

impl FromStack for String {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        rt.check_str(index)
    }
}

impl FromStack for ByteStr {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        rt.check_bytes(index)
    }
}

impl<T: FromStack> FromStack for Option<T> {
    fn read_from(rt: &Runtime, index: i32) -> Result<Self, RuntimeError> {
        if rt.value_at(index).is_nil() {
            Ok(None)
        } else {
            T::read_from(rt, index).map(Some)
        }
    }
}
