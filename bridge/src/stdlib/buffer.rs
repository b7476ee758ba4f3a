use memory::TypeTag;

use crate::error::RuntimeError;
use crate::machine::Runtime;
use crate::marshal::ByteStr;
use crate::module::ModuleDef;
use crate::native::{Arity, NativeFunction, Results};

pub const BUFFER: TypeTag = TypeTag::new("satell.buffer");

/// Payload of a `satell.buffer` handle.
#[derive(Debug, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

const FUNCTIONS: &[NativeFunction] = &[
    NativeFunction::new("new", native_new, Arity::exact(0), Results::Fixed(1)),
    NativeFunction::new("append", native_append, Arity::exact(2), Results::Fixed(1)),
    NativeFunction::new("tostring", native_tostring, Arity::exact(1), Results::Fixed(1)),
    NativeFunction::new("len", native_len, Arity::exact(1), Results::Fixed(1)),
    NativeFunction::new("close", native_close, Arity::exact(1), Results::Fixed(0)),
];

pub static MODULE: ModuleDef = ModuleDef::new("satell.buffer", FUNCTIONS);

pub fn native_new(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push_foreign(BUFFER, Buffer::default(), None)?;
    Ok(1)
}

pub fn native_append(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let text: ByteStr = rt.check_bytes(2)?;
    rt.check_foreign(1, BUFFER, |buf: &mut Buffer| {
        buf.bytes.try_reserve(text.len())?;
        buf.bytes.extend_from_slice(&text);
        Ok::<_, std::collections::TryReserveError>(())
    })?
    .map_err(|_| RuntimeError::OutOfMemory)?;
    let this = rt.value_at(1);
    rt.push_value(this)?;
    Ok(1)
}

pub fn native_tostring(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let bytes = rt.check_foreign(1, BUFFER, |buf: &mut Buffer| buf.bytes.clone())?;
    rt.push(bytes.as_slice())?;
    Ok(1)
}

pub fn native_len(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let len = rt.check_foreign(1, BUFFER, |buf: &mut Buffer| buf.bytes.len())?;
    rt.push(len)?;
    Ok(1)
}

pub fn native_close(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let this = rt.value_at(1);
    rt.close_foreign(this, BUFFER)?;
    Ok(0)
}
