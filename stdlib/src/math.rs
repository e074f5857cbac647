use std::cmp::Ordering;

use candy_core::{
    error::{ErrorKind, VmError, VmResult},
    module::{Export, Module},
    op,
    val::{Arity, Value},
    vm::Vm,
};

/// The `math` object.
#[derive(Debug, Default)]
pub struct MathModule;

impl Module for MathModule {
    fn name(&self) -> &'static str {
        "math"
    }

    fn description(&self) -> &str {
        "numeric helpers"
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            Export::new("abs", abs, Arity::exact(1)),
            Export::new("sqrt", sqrt, Arity::exact(1)),
            Export::new("floor", floor, Arity::exact(1)),
            Export::new("ceil", ceil, Arity::exact(1)),
            Export::new("pow", pow, Arity::exact(2)),
            Export::new("min", min, Arity::at_least(1)),
            Export::new("max", max, Arity::at_least(1)),
        ]
    }

    fn constants(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("pi", Value::Float(std::f64::consts::PI)),
            ("e", Value::Float(std::f64::consts::E)),
        ]
    }
}

fn number(func: &'static str, v: &Value) -> VmResult<f64> {
    v.as_number().ok_or_else(|| {
        ErrorKind::InvalidOperand {
            op: func,
            operand: v.type_name(),
        }
        .into()
    })
}

fn abs(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        other => Ok(Value::Float(number("abs", other)?.abs())),
    }
}

fn sqrt(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let x = number("sqrt", &args[0])?;
    if x < 0.0 {
        return Err(VmError::native(format!("sqrt() of negative number {x}")));
    }
    Ok(Value::Float(x.sqrt()))
}

/// Integers pass through; floats are rounded but stay floats.
fn rounded(func: &'static str, v: &Value, f: fn(f64) -> f64) -> VmResult<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        other => Ok(Value::Float(f(number(func, other)?))),
    }
}

fn floor(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    rounded("floor", &args[0], f64::floor)
}

fn ceil(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    rounded("ceil", &args[0], f64::ceil)
}

/// Integer power when it fits, float otherwise.
fn pow(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    if let (Value::Int(base), Value::Int(exp)) = (&args[0], &args[1]) {
        if let Some(n) = u32::try_from(*exp).ok().and_then(|e| base.checked_pow(e)) {
            return Ok(Value::Int(n));
        }
    }
    let base = number("pow", &args[0])?;
    let exp = number("pow", &args[1])?;
    Ok(Value::Float(base.powf(exp)))
}

fn pick(func: &'static str, args: &[Value], want: Ordering) -> VmResult<Value> {
    let mut best = &args[0];
    number(func, best)?;
    for v in &args[1..] {
        number(func, v)?;
        if op::compare(v, best)?.cmp(&0) == want {
            best = v;
        }
    }
    Ok(best.clone())
}

fn min(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    pick("min", args, Ordering::Less)
}

fn max(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    pick("max", args, Ordering::Greater)
}
