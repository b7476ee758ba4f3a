use crate::error::RuntimeError;
use crate::machine::Runtime;
use crate::marshal::ByteStr;
use crate::module::ModuleDef;
use crate::native::{Arity, NativeFunction, Results};

const FUNCTIONS: &[NativeFunction] = &[
    NativeFunction::new("hello", native_hello, Arity::exact(1), Results::Fixed(1)),
    NativeFunction::new("version", native_version, Arity::exact(0), Results::Fixed(1)),
    NativeFunction::new("split", native_split, Arity::exact(2), Results::Fixed(1)),
    NativeFunction::new("concat", native_concat, Arity::exact(2), Results::Fixed(1)),
];

pub static MODULE: ModuleDef = ModuleDef::new("satell.ext", FUNCTIONS);

/// Pieces of `text` between single-byte delimiters. A trailing delimiter
/// does not produce an empty last piece.
pub fn split_bytes(text: &[u8], delimiter: u8) -> Vec<&[u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let end = text[start..]
            .iter()
            .position(|&b| b == delimiter)
            .map_or(text.len(), |off| start + off);
        pieces.push(&text[start..end]);
        start = end + 1;
    }
    pieces
}

/// `a .. b` with fallible allocation.
pub fn concat_bytes(a: &[u8], b: &[u8]) -> Result<Vec<u8>, RuntimeError> {
    let total = a.len().checked_add(b.len()).ok_or(RuntimeError::OutOfMemory)?;
    let mut out = Vec::new();
    out.try_reserve_exact(total)
        .map_err(|_| RuntimeError::OutOfMemory)?;
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    Ok(out)
}

pub fn native_hello(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let name: ByteStr = rt.next_arg()?;
    let mut greeting = b"Hello from Satell native extensions, ".to_vec();
    greeting.extend_from_slice(&name);
    greeting.push(b'!');
    rt.push(greeting.as_slice())?;
    Ok(1)
}

pub fn native_version(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push(format!(
        "Satell Native Extensions v{} (Rust)",
        env!("CARGO_PKG_VERSION")
    ))?;
    Ok(1)
}

pub fn native_split(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let text: ByteStr = rt.next_arg()?;
    let delimiter: ByteStr = rt.next_arg()?;
    let &[delimiter] = &*delimiter else {
        return Err(rt.argument_error(2, "delimiter must be a single character"));
    };

    let pieces = split_bytes(&text, delimiter);
    let table = rt.new_table(pieces.len(), 0)?;
    rt.push_value(table)?;
    for (i, piece) in pieces.into_iter().enumerate() {
        let s = rt.new_string(piece)?;
        rt.raw_set(table, memory::Value::int(i as i64 + 1), s)?;
    }
    Ok(1)
}

pub fn native_concat(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let a: ByteStr = rt.next_arg()?;
    let b: ByteStr = rt.next_arg()?;
    let joined = concat_bytes(&a, &b)?;
    rt.push(joined.as_slice())?;
    Ok(1)
}
