use super::*;

#[test]
fn adds_two_constants() {
    assert_eq!(run("push 2\npush 3\nadd\nreturn").unwrap(), Value::Int(5));
}

#[test]
fn falling_off_the_end_returns_empty() {
    assert_eq!(run("push 1").unwrap(), Value::Empty);
    assert_eq!(run("").unwrap(), Value::Empty);
}

#[test]
fn loop_with_locals() {
    let src = "
let i
let sum
push 0 store sum
push 1 store i
top:
    load i push 10 gt jnz done
    load sum load i add store sum
    load i incr store i
    jmp top
done:
load sum return
";
    assert_eq!(run(src).unwrap(), Value::Int(55));
}

#[test]
fn globals() {
    let src = "
push 1 define x
load_global x push 2 add store_global x
load_global x return
";
    let mut vm = Vm::new();
    assert_eq!(run_on(&mut vm, src).unwrap(), Value::Int(3));
    assert_eq!(vm.global("x"), Some(Value::Int(3)));
}

#[test]
fn typed_global_store() {
    let err = run("push 1 define x push \"s\" store_global x").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleAssign { .. }));
}

#[test]
fn object_members() {
    assert_eq!(
        run("new_object push 1 add_child a get_attr a return").unwrap(),
        Value::Int(1)
    );
    assert_eq!(
        run("new_object dup push 5 set_attr v get_attr v return").unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        run("new_object dup push \"k\" push 8 set_index push \"k\" get_index return").unwrap(),
        Value::Int(8)
    );
}

#[test]
fn arrays_and_indexing() {
    let src = "new_array push 1 append push 2 append dup push 1 get_index return";
    assert_eq!(run(src).unwrap(), Value::Int(2));

    let src = "new_array push 1 append dup push 0 push 9 set_index push 0 get_index return";
    assert_eq!(run(src).unwrap(), Value::Int(9));

    let err = run("new_array push 1 append push \"x\" append").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ArrayType { .. }));

    let err = run("new_array push 0 get_index").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexOutOfRange { index: 0, len: 0 });
}

#[test]
fn string_operations() {
    assert_eq!(run("push \"ab\" push \"cd\" add return").unwrap(), Value::str("abcd"));
    assert_eq!(run("push \"abc\" push 1 get_index return").unwrap(), Value::str("b"));
    assert_eq!(
        run("push \"abc\" dup get_attr len call_method 0 return").unwrap(),
        Value::Int(3)
    );
}

#[test]
fn core_methods_on_arrays() {
    let src = "
new_array
dup dup get_attr append push 4 call_method 1 pop
dup get_attr len call_method 0
return
";
    assert_eq!(run(src).unwrap(), Value::Int(1));
}

#[test]
fn object_members_shadow_methods() {
    let src = "
new_object push 7 add_child len
dup get_attr len
return
";
    assert_eq!(run(src).unwrap(), Value::Int(7));
}

#[test]
fn end_halts_with_the_top_value() {
    assert_eq!(run("push 7 end push 8 return").unwrap(), Value::Int(7));
}

#[test]
fn logical_and_comparison_results_are_integers() {
    assert_eq!(run("push 1 push 2 lt return").unwrap(), Value::Int(1));
    assert_eq!(run("push 1 push 0 land return").unwrap(), Value::Int(0));
    assert_eq!(run("push 0 not return").unwrap(), Value::Int(1));
}

#[test]
fn locals_are_released_after_execution() {
    let mut vm = Vm::new();
    let baseline = vm.heap().live();
    run_on(&mut vm, "let a let b new_object store a new_array store b").unwrap();
    assert_eq!(vm.heap().live(), baseline);
    assert_eq!(vm.frame_count(), 0);
}
