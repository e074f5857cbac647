use super::*;

#[test]
fn divide_by_zero_is_reported_and_the_vm_stays_usable() {
    let mut vm = Vm::new();
    let err = run_on(&mut vm, "push 1\npush 0\ndiv\nreturn").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivideByZero);
    let loc = err.location.clone().unwrap();
    assert_eq!((loc.file.as_str(), loc.line), ("t.cdy", 3));
    assert_eq!(err.to_string(), "t.cdy:3: division by zero\n    at main (t.cdy:3)");

    assert_eq!(vm.frame_count(), 0);
    assert_eq!(run_on(&mut vm, "push 2 push 3 add return").unwrap(), Value::Int(5));
}

#[test]
fn error_in_a_function_has_a_backtrace() {
    let src = "
.func f 0
    push 1 push 0 mod
.end
make_func f call 0
";
    let err = run(src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DivideByZero);
    assert_eq!(err.backtrace, vec!["f (t.cdy:3)".to_string(), "main (t.cdy:5)".to_string()]);
}

#[test]
fn unwinding_releases_every_slot() {
    let src = "
.func f 1 x
    let tmp
    new_object push 1 add_child a store tmp
    push 1 push 0 div
    return
.end
make_func f push 3 call 1 return
";
    let mut vm = Vm::new();
    let baseline = vm.heap().live();
    assert!(run_on(&mut vm, src).is_err());
    assert_eq!(vm.heap().live(), baseline);
    assert_eq!(vm.depth(), 0);
}

#[test]
fn operand_stack_overflow() {
    let mut vm = Vm::with_config(VmConfig::default().with_max_stack(4));
    let err = run_on(&mut vm, "push 1 push 1 push 1 push 1 push 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow(4));
}

#[test]
fn undefined_global() {
    let err = run("load_global nope").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined("nope".into()));
    let err = run("push 1 store_global nope").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined("nope".into()));
}

#[test]
fn globals_do_not_fall_back_to_object_methods() {
    for name in ["has", "len", "foreach"] {
        let err = run(&format!("load_global {name} return")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Undefined(name.into()));
    }
}

#[test]
fn missing_member() {
    let err = run("new_object get_attr nope").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::NoSuchMember {
            kind: "object",
            name: "nope".into()
        }
    );
    let err = run("push 1 get_attr len").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NoSuchMember { kind: "integer", .. }));
}

#[test]
fn bad_operands() {
    let err = run("push 1 push \"a\" sub").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidOperands { .. }));
    let err = run("push 1 push 64 shl").unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadShift(64));
    let err = run("push 1 push 2 get_index").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotIndexable { .. }));
}

#[test]
fn malformed_code_is_an_error_not_a_crash() {
    let err = run("pop").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));
    let err = run("load 3").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));
    let err = run("load_clo 0").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));
    let err = run("push 1 add_closure").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedCode(_)));
}

#[test]
fn cycles_through_script_code_are_rejected() {
    let src = "
new_object define a
load_global a dup set_attr self
";
    let err = run(src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cycle);
}
