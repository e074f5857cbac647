use candy_core::{
    error::{ErrorKind, VmError, VmResult},
    module::{Export, Module},
    val::{Arity, StrHandle, Value},
    vm::Vm,
};

/// Type inspection and conversion globals.
#[derive(Debug, Default)]
pub struct TypesModule;

impl Module for TypesModule {
    fn name(&self) -> &'static str {
        "types"
    }

    fn description(&self) -> &str {
        "type inspection and conversions"
    }

    fn prelude(&self) -> bool {
        true
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            Export::new("typeof", type_of, Arity::exact(1)),
            Export::new("len", len, Arity::exact(1)),
            Export::new("int", to_int, Arity::exact(1)),
            Export::new("float", to_float, Arity::exact(1)),
            Export::new("str", to_str, Arity::exact(1)),
            Export::new("assert", assert, Arity::range(1, 2)),
        ]
    }
}

fn bad_arg(func: &'static str, v: &Value) -> VmError {
    ErrorKind::InvalidOperand {
        op: func,
        operand: v.type_name(),
    }
    .into()
}

fn type_of(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::str(args[0].type_name()))
}

fn len(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let n = match &args[0] {
        Value::Str(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        other => return Err(bad_arg("len", other)),
    };
    Ok(Value::Int(n as i64))
}

fn to_int(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Str(s) => {
            let text = s.to_string();
            text.trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| VmError::native(format!("int(): cannot parse {text:?}")))
        }
        other => Err(bad_arg("int", other)),
    }
}

fn to_float(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => {
            let text = s.to_string();
            text.trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| VmError::native(format!("float(): cannot parse {text:?}")))
        }
        other => Err(bad_arg("float", other)),
    }
}

/// Always a fresh string, so appending to the result never touches the input.
fn to_str(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    match &args[0] {
        Value::Str(s) => Ok(Value::Str(StrHandle::from_bytes(&s.to_bytes()))),
        Value::Ptr(_) => Err(bad_arg("str", &args[0])),
        other => Ok(Value::str(&other.to_string())),
    }
}

fn assert(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    if args[0].is_truthy() {
        return Ok(Value::Empty);
    }
    Err(match args.get(1) {
        Some(msg) => VmError::native(format!("assertion failed: {msg}")),
        None => VmError::native("assertion failed"),
    })
}
