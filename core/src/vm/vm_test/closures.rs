use super::*;

const COUNTER: &str = "
.func inc 0
    load_clo 0 incr store_clo 0
    load_clo 0 return
.end
.func peek 0
    load_clo 0 return
.end
let counter
push 0 store counter
make_func inc ref counter add_closure define inc
make_func peek ref counter add_closure define peek
load_global inc call 0 pop
load_global inc call 0 pop
load counter return
";

#[test]
fn captured_variable_is_shared() {
    let mut vm = Vm::new();
    assert_eq!(run_on(&mut vm, COUNTER).unwrap(), Value::Int(2));

    // The variable outlives the frame that declared it.
    let inc = vm.global("inc").unwrap();
    let peek = vm.global("peek").unwrap();
    assert_eq!(vm.call_value(&inc, None, &[]).unwrap(), Value::Int(3));
    assert_eq!(vm.call_value(&peek, None, &[]).unwrap(), Value::Int(3));
}

#[test]
fn captured_slot_is_freed_with_its_last_closure() {
    let mut vm = Vm::new();
    run_on(&mut vm, COUNTER).unwrap();
    // Two globals plus the shared variable.
    assert_eq!(vm.heap().live(), 3);
    vm.define_global("inc", Value::Int(0)).unwrap();
    vm.collect();
    assert_eq!(vm.heap().live(), 3);
    vm.define_global("peek", Value::Int(0)).unwrap();
    vm.collect();
    assert_eq!(vm.heap().live(), 2);
}

#[test]
fn capture_by_value() {
    let src = "
.func get 0
    load_clo 0 return
.end
make_func get push 9 add_closure call 0 return
";
    assert_eq!(run(src).unwrap(), Value::Int(9));
}

#[test]
fn nested_capture_through_a_closure_variable() {
    let src = "
.func inner 0
    load_clo 0 push 1 add return
.end
.func outer 0
    make_func inner ref_clo 0 add_closure call 0 return
.end
make_func outer push 41 add_closure call 0 return
";
    assert_eq!(run(src).unwrap(), Value::Int(42));
}

#[test]
fn closure_limit() {
    let src = "
.func f 0
    return
.end
make_func f push 1 add_closure push 2 add_closure
";
    let mut vm = Vm::with_config(VmConfig {
        max_closures: 1,
        ..VmConfig::default()
    });
    let err = run_on(&mut vm, src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClosureLimit(1));
}

#[test]
fn default_must_name_a_parameter() {
    let src = "
.func f 1
    return
.end
make_func f push 1 add_default 1
";
    let err = run(src).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));
}

#[test]
fn internal_pointers_cannot_be_stored() {
    let err = run("let a let b ref a store b").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleAssign { .. }));

    let err = run("let a new_array ref a append").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidOperand { .. }));

    let mut vm = Vm::new();
    let err = run_on(&mut vm, "let a ref a define leak push 0 return").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleAssign { .. }));
    assert!(vm.global("leak").is_none());

    let err = run("let a new_object ref a add_child m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleAssign { .. }));

    let err = run("let a new_object ref a set_attr m").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleAssign { .. }));
}

#[test]
fn internal_pointers_cannot_be_returned() {
    let err = run("let a ref a return").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));

    let err = run("let a ref a end").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));

    let src = "
.func f 0
    let a ref a return
.end
make_func f call 0 return
";
    let err = run(src).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));
}

fn assert_cycle_without_leak(src: &str) {
    let mut vm = Vm::new();
    let baseline = vm.heap().live();
    let err = run_on(&mut vm, src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cycle);
    assert_eq!(vm.heap().live(), baseline);
}

const NOOP: &str = "
.func f 1
    return
.end
";

#[test]
fn closure_cannot_be_stored_in_its_own_capture() {
    assert_cycle_without_leak(&format!("{NOOP}let g\nmake_func f ref g add_closure store g\npush 0 return"));
}

#[test]
fn object_holding_a_closure_cannot_be_stored_in_its_capture() {
    assert_cycle_without_leak(&format!(
        "{NOOP}let x\nnew_object make_func f ref x add_closure add_child m store x\npush 0 return"
    ));
}

#[test]
fn closure_cannot_capture_a_slot_holding_itself() {
    assert_cycle_without_leak(&format!("{NOOP}let g\nmake_func f store g\nload g ref g add_closure\npush 0 return"));
    assert_cycle_without_leak(&format!("{NOOP}make_func f dup add_closure\npush 0 return"));
}

#[test]
fn closure_cannot_default_to_itself() {
    assert_cycle_without_leak(&format!("{NOOP}make_func f dup add_default 0\npush 0 return"));
}

#[test]
fn closure_can_be_stored_next_to_its_capture() {
    let src = "
.func get 0
    load_clo 0 return
.end
let v let g
push 4 store v
make_func get ref v add_closure store g
load g call 0 return
";
    let mut vm = Vm::new();
    let baseline = vm.heap().live();
    assert_eq!(run_on(&mut vm, src).unwrap(), Value::Int(4));
    assert_eq!(vm.heap().live(), baseline);
}
