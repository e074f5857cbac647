use super::*;

fn twice(_vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i * 2)),
        other => Err(VmError::native(format!("twice() needs an integer, got {}", other.type_name()))),
    }
}

fn depth(vm: &mut Vm, _this: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::Int(vm.depth() as i64))
}

/// Calls its argument with no arguments and returns the result.
fn apply(vm: &mut Vm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    vm.call_value(&args[0], None, &[])
}

fn vm_with_natives() -> Vm {
    let mut vm = Vm::new();
    vm.define_native("twice", twice, Arity::exact(1)).unwrap();
    vm.define_native("depth", depth, Arity::exact(0)).unwrap();
    vm.define_native("apply", apply, Arity::exact(1)).unwrap();
    vm
}

#[test]
fn calls_a_native() {
    let mut vm = vm_with_natives();
    assert_eq!(
        run_on(&mut vm, "load_global twice push 21 call 1 return").unwrap(),
        Value::Int(42)
    );
}

#[test]
fn native_arity_is_checked() {
    let mut vm = vm_with_natives();
    let err = run_on(&mut vm, "load_global twice call 0").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ArgCount { got: 0, .. }));
}

#[test]
fn native_errors_are_located() {
    let mut vm = vm_with_natives();
    let err = run_on(&mut vm, "push 1\nload_global twice push \"x\" call 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Native("twice() needs an integer, got string".into()));
    assert_eq!(err.location.as_ref().map(|l| l.line), Some(2));
}

#[test]
fn depth_counts_natives_and_closures() {
    let src = "
.func f 0
    load_global depth call 0 return
.end
load_global depth call 0
make_func f call 0
push 10 mul add return
";
    let mut vm = vm_with_natives();
    assert_eq!(run_on(&mut vm, src).unwrap(), Value::Int(21));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn reentry_through_a_native() {
    let src = "
.func seven 0
    push 7 return
.end
load_global apply make_func seven call 1
push 1 add return
";
    let mut vm = vm_with_natives();
    assert_eq!(run_on(&mut vm, src).unwrap(), Value::Int(8));
    assert_eq!(vm.frame_count(), 0);
}

#[test]
fn error_inside_reentry_unwinds_everything() {
    let src = "
.func bad 0
    push 1 push 0 div return
.end
load_global apply make_func bad call 1
";
    let mut vm = vm_with_natives();
    let err = run_on(&mut vm, src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivideByZero);
    assert_eq!(err.location.as_ref().map(|l| l.line), Some(3));
    assert_eq!(vm.frame_count(), 0);
    assert_eq!(vm.depth(), 0);
    // Inner frame, then the top level it was entered from.
    assert_eq!(err.backtrace.len(), 2);
    assert!(err.backtrace[0].starts_with("bad "));
}

#[test]
fn foreach_calls_back_into_the_vm() {
    let src = "
.func add_to 2 v i
    load_global total load v add load i add store_global total
    return
.end
push 0 define total
new_array push 10 append push 20 append push 30 append
dup get_attr foreach make_func add_to call_method 1
pop
load_global total return
";
    // 10 + 20 + 30 plus indices 0 + 1 + 2
    assert_eq!(run(src).unwrap(), Value::Int(63));
}

#[test]
fn object_foreach_passes_names() {
    let src = "
.func visit 2 v name
    load_global seen load name add store_global seen
    return
.end
push \"\" define seen
new_object push 1 add_child a push 2 add_child b
dup get_attr foreach make_func visit call_method 1
pop
load_global seen return
";
    assert_eq!(run(src).unwrap(), Value::str("ab"));
}

#[test]
fn end_inside_a_callback_halts_the_program() {
    let src = "
.func stop 2 v i
    load v end
.end
new_array push 1 append push 2 append
dup get_attr foreach make_func stop call_method 1
push 99 return
";
    let mut vm = Vm::new();
    assert_eq!(run_on(&mut vm, src).unwrap(), Value::Int(1));
    assert_eq!(vm.frame_count(), 0);
    assert_eq!(vm.depth(), 0);

    // The next entry runs normally.
    assert_eq!(run_on(&mut vm, "push 5 return").unwrap(), Value::Int(5));
}

#[test]
fn calling_a_non_function() {
    let err = run("push 1 call 0").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotCallable("integer"));

    let mut vm = Vm::new();
    let err = vm.call_value(&Value::Int(1), None, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotCallable("integer"));
}
