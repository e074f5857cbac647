use std::io::Write;

use candy_core::{
    error::{VmError, VmResult},
    module::{Export, Module},
    val::{Arity, Value},
    vm::Vm,
};

/// `print` and `println`, installed as globals.
#[derive(Debug, Default)]
pub struct IoModule;

impl Module for IoModule {
    fn name(&self) -> &'static str {
        "io"
    }

    fn description(&self) -> &str {
        "console output"
    }

    fn prelude(&self) -> bool {
        true
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            Export::new("print", print, Arity::at_least(0)),
            Export::new("println", println, Arity::at_least(0)),
        ]
    }
}

/// Render arguments the way `print` does.
///
/// A leading string is a format: each `{}` takes the next argument. Arguments
/// left over are appended, separated by spaces.
pub fn format_values(args: &[Value]) -> String {
    let Some((Value::Str(fmt), rest)) = args.split_first() else {
        return join(args);
    };
    let fmt = fmt.to_string();
    let mut out = String::with_capacity(fmt.len() + rest.len() * 8);
    let mut used = 0usize;
    let mut pieces = fmt.split("{}");
    if let Some(first) = pieces.next() {
        out.push_str(first);
    }
    for piece in pieces {
        match rest.get(used) {
            Some(v) => {
                out.push_str(&v.to_string());
                used += 1;
            }
            None => out.push_str("{}"),
        }
        out.push_str(piece);
    }
    if used < rest.len() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&join(&rest[used..]));
    }
    out
}

fn join(args: &[Value]) -> String {
    args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

fn emit(text: &str, newline: bool) -> VmResult<Value> {
    let mut stdout = std::io::stdout().lock();
    let written = if newline {
        writeln!(stdout, "{text}")
    } else {
        write!(stdout, "{text}").and_then(|_| stdout.flush())
    };
    written.map_err(|e| VmError::native(format!("cannot write to stdout: {e}")))?;
    Ok(Value::Empty)
}

fn print(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    emit(&format_values(args), false)
}

fn println(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    emit(&format_values(args), true)
}
