//! Module registration: entry-point naming, loading, caching and the
//! bundled `satell.ext` / `satell.buffer` modules.

use bridge::{
    entry_symbol, Arity, ControlFlowOps, ErrorKind, ForeignState, IntoStack, ModuleDef,
    NativeFunction, NativeRegistry, Results, Runtime, RuntimeError, Value,
};

// ============================================================================
// Helpers
// ============================================================================

/// Call `module.function(args...)` and return its results.
fn call_export(
    rt: &mut Runtime,
    module: Value,
    function: &str,
    args: Vec<Value>,
) -> Result<Vec<Value>, RuntimeError> {
    let base = rt.gettop();
    let func = rt.get_field(module, function)?;
    rt.push_value(func)?;
    let nargs = args.len();
    for a in args {
        rt.push_value(a)?;
    }
    let n = rt.call(nargs, None)?;
    let results = rt.frame_values()[base..base + n].to_vec();
    rt.settop(base)?;
    Ok(results)
}

fn text(rt: &mut Runtime, s: &str) -> Value {
    rt.new_string(s.as_bytes()).unwrap()
}

fn display(rt: &Runtime, v: Value) -> String {
    rt.to_display(v)
}

fn greet(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push("hi")?;
    Ok(1)
}

fn open_greeter(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let name: String = rt.next_arg()?;
    let table = rt.register(&[("greet", greet)])?;
    rt.push_value(table)?;
    let name = rt.new_string(name.as_bytes())?;
    rt.set_field(table, "name", name)?;
    Ok(1)
}

fn open_broken(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    42i64.push_to(rt)?;
    Ok(1)
}

const GREETER_FUNCTIONS: &[NativeFunction] = &[NativeFunction::new(
    "greet",
    greet,
    Arity::exact(0),
    Results::Fixed(1),
)];
static GREETER: ModuleDef = ModuleDef::new("demo.greeter", GREETER_FUNCTIONS);
static OTHER_GREETER: ModuleDef = ModuleDef::new("demo.greeter", GREETER_FUNCTIONS);

// ============================================================================
// Loading and caching
// ============================================================================

#[test]
fn test_bundled_modules_are_preloaded() {
    let rt = Runtime::new();
    let mut symbols: Vec<&str> = rt.loader.symbols().collect();
    symbols.sort_unstable();
    assert_eq!(symbols, vec!["luaopen_satell_buffer", "luaopen_satell_ext"]);
    assert!(!rt.loader.is_loaded("satell.ext"));
}

#[test]
fn test_require_is_idempotent() {
    let mut rt = Runtime::new();
    let first = rt.require("satell.ext").unwrap();
    assert!(first.is_table());
    assert!(rt.loader.is_loaded("satell.ext"));
    let hello = rt.get_field(first, "hello").unwrap();

    let second = rt.require("satell.ext").unwrap();
    assert_eq!(first, second);
    // Version suffixes resolve to the same entry point.
    assert_eq!(rt.require("satell.ext-1.0").unwrap(), first);
    assert_eq!(rt.get_field(second, "hello").unwrap(), hello);
    // Exports live in the keyed part only.
    assert_eq!(rt.raw_len(first).unwrap(), 0);
}

#[test]
fn test_loaded_module_survives_collection() {
    use bridge::GarbageCollector;

    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    rt.collect_garbage();
    let out = call_export(&mut rt, ext, "version", vec![]).unwrap();
    assert!(display(&rt, out[0]).starts_with("Satell Native Extensions v"));
}

#[test]
fn test_unknown_module() {
    let mut rt = Runtime::new();
    let err = rt.require("satell.nope").unwrap_err();
    assert_eq!(
        err,
        RuntimeError::ModuleNotFound {
            name: "satell.nope".into(),
            symbol: "luaopen_satell_nope".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::ModuleNotFound);
}

#[test]
fn test_entry_symbol_convention() {
    assert_eq!(entry_symbol("satell.ext"), "luaopen_satell_ext");
    assert_eq!(GREETER.entry_symbol(), "luaopen_demo_greeter");
}

#[test]
fn test_preload_static_definition() {
    let mut rt = Runtime::new();
    rt.loader.preload(&GREETER).unwrap();
    // Same definition again is a no-op.
    rt.loader.preload(&GREETER).unwrap();

    let module = rt.require("demo.greeter").unwrap();
    let out = call_export(&mut rt, module, "greet", vec![]).unwrap();
    assert_eq!(display(&rt, out[0]), "hi");

    let err = rt.loader.preload(&OTHER_GREETER).unwrap_err();
    assert!(err.to_string().contains("module already loaded"), "{err}");
}

#[test]
fn test_preload_open_function() {
    let mut rt = Runtime::new();
    rt.loader
        .preload_open(NativeFunction::new(
            "luaopen_demo_dynamic",
            open_greeter,
            Arity::exact(1),
            Results::Fixed(1),
        ))
        .unwrap();

    let module = rt.require("demo.dynamic").unwrap();
    let name = rt.get_field(module, "name").unwrap();
    assert_eq!(display(&rt, name), "demo.dynamic");
    let out = call_export(&mut rt, module, "greet", vec![]).unwrap();
    assert_eq!(display(&rt, out[0]), "hi");
    assert_eq!(rt.gettop(), 0);
}

#[test]
fn test_open_function_must_return_table() {
    let mut rt = Runtime::new();
    rt.loader
        .preload_open(NativeFunction::new(
            "luaopen_demo_broken",
            open_broken,
            Arity::ANY,
            Results::Fixed(1),
        ))
        .unwrap();
    let err = rt.require("demo.broken").unwrap_err();
    assert!(err.to_string().contains("not a table"), "{err}");
    assert!(!rt.loader.is_loaded("demo.broken"));
}

#[test]
fn test_register_rejects_duplicate_names() {
    let mut rt = Runtime::new();
    let err = rt
        .register(&[("greet", greet), ("greet", greet)])
        .unwrap_err();
    assert!(err.to_string().contains("duplicate export 'greet'"), "{err}");

    let lib = rt.register(&[("a", greet), ("b", greet)]).unwrap();
    assert!(rt.get_field(lib, "a").unwrap().is_function());
    assert!(rt.get_field(lib, "b").unwrap().is_function());
}

// ============================================================================
// satell.ext
// ============================================================================

#[test]
fn test_hello() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    let name = text(&mut rt, "World");
    let out = call_export(&mut rt, ext, "hello", vec![name]).unwrap();
    assert_eq!(display(&rt, out[0]), "Hello from Satell native extensions, World!");
}

#[test]
fn test_hello_requires_a_name() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    let err = call_export(&mut rt, ext, "hello", vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityError);

    let err = call_export(&mut rt, ext, "hello", vec![Value::Bool(true)]).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 (string expected, got boolean)");
}

#[test]
fn test_version() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    let out = call_export(&mut rt, ext, "version", vec![]).unwrap();
    assert_eq!(
        display(&rt, out[0]),
        format!("Satell Native Extensions v{} (Rust)", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_split_keeps_empty_pieces() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    let (s, d) = (text(&mut rt, "a,b,,c"), text(&mut rt, ","));
    let out = call_export(&mut rt, ext, "split", vec![s, d]).unwrap();
    assert_eq!(rt.table_strings(out[0]).unwrap(), vec!["a", "b", "", "c"]);
    assert_eq!(rt.raw_len(out[0]).unwrap(), 4);
}

#[test]
fn test_split_edges() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    for (input, expected) in [("", vec![]), ("a,", vec!["a"]), ("abc", vec!["abc"])] {
        let (s, d) = (text(&mut rt, input), text(&mut rt, ","));
        let out = call_export(&mut rt, ext, "split", vec![s, d]).unwrap();
        assert_eq!(rt.table_strings(out[0]).unwrap(), expected, "input {input:?}");
    }
}

#[test]
fn test_split_rejects_multi_byte_delimiter() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    for delimiter in [",,", ""] {
        let (s, d) = (text(&mut rt, "a,b"), text(&mut rt, delimiter));
        let err = call_export(&mut rt, ext, "split", vec![s, d]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidArgument {
                index: 2,
                message: "delimiter must be a single character".into()
            }
        );
    }
    assert_eq!(rt.gettop(), 0);
}

#[test]
fn test_concat() {
    let mut rt = Runtime::new();
    let ext = rt.require("satell.ext").unwrap();
    let (a, b) = (text(&mut rt, "foo"), text(&mut rt, "bar"));
    let out = call_export(&mut rt, ext, "concat", vec![a, b]).unwrap();
    assert_eq!(display(&rt, out[0]), "foobar");

    // Numbers are accepted where strings are expected.
    let out = call_export(&mut rt, ext, "concat", vec![Value::int(1), Value::float(2.5)]).unwrap();
    assert_eq!(display(&rt, out[0]), "12.5");
}

// ============================================================================
// satell.buffer
// ============================================================================

#[test]
fn test_buffer_lifecycle() {
    let mut rt = Runtime::new();
    let buffer = rt.require("satell.buffer").unwrap();

    let buf = call_export(&mut rt, buffer, "new", vec![]).unwrap()[0];
    // Keep the handle anchored across calls.
    rt.set_global("buf", buf);

    for piece in ["ab", "cd"] {
        let s = text(&mut rt, piece);
        let out = call_export(&mut rt, buffer, "append", vec![buf, s]).unwrap();
        assert_eq!(out[0], buf);
    }
    let out = call_export(&mut rt, buffer, "tostring", vec![buf]).unwrap();
    assert_eq!(display(&rt, out[0]), "abcd");
    let out = call_export(&mut rt, buffer, "len", vec![buf]).unwrap();
    assert_eq!(out[0], Value::int(4));

    assert!(call_export(&mut rt, buffer, "close", vec![buf]).unwrap().is_empty());
    assert_eq!(rt.foreign_state(buf), Some(ForeignState::Tombstoned));

    let err = call_export(&mut rt, buffer, "len", vec![buf]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UseAfterFinalize);
    assert!(err.kind().is_programming_error());
}

#[test]
fn test_buffer_rejects_other_values() {
    let mut rt = Runtime::new();
    let buffer = rt.require("satell.buffer").unwrap();
    let table = rt.create_table(0, 0).unwrap();
    let err = call_export(&mut rt, buffer, "len", vec![table]).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 (foreign expected, got table)");
}
