//! Static module definitions and the entry-point naming convention.

use crate::native::NativeFunction;

/// Prefix of every module entry-point symbol.
pub const ENTRY_PREFIX: &str = "luaopen_";

/// A module's export table, fixed at compile time.
///
/// Build it as a `const` or `static`: a repeated export name then fails
/// constant evaluation and the module does not compile.
#[derive(Debug)]
pub struct ModuleDef {
    pub name: &'static str,
    pub functions: &'static [NativeFunction],
}

impl ModuleDef {
    pub const fn new(name: &'static str, functions: &'static [NativeFunction]) -> Self {
        let mut i = 0;
        while i < functions.len() {
            let mut j = i + 1;
            while j < functions.len() {
                if str_eq(functions[i].name, functions[j].name) {
                    panic!("duplicate export name in module definition");
                }
                j += 1;
            }
            i += 1;
        }
        Self { name, functions }
    }

    pub fn entry_symbol(&self) -> String {
        entry_symbol(self.name)
    }

    pub fn get(&self, name: &str) -> Option<&'static NativeFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Entry-point symbol for a requested module name: `luaopen_` plus the
/// name with `.` replaced by `_`. Anything from the first `-` on is a
/// version suffix and is ignored.
pub fn entry_symbol(name: &str) -> String {
    let base = name.split('-').next().unwrap_or(name);
    let mut symbol = String::with_capacity(ENTRY_PREFIX.len() + base.len());
    symbol.push_str(ENTRY_PREFIX);
    symbol.extend(base.chars().map(|c| if c == '.' { '_' } else { c }));
    symbol
}
