use super::*;

const ADD_WITH_DEFAULT: &str = "
.func f 2 a b
    load a load b add return
.end
make_func f
push 10 add_default 1
define f
";

#[test]
fn default_arguments() {
    let mut vm = Vm::new();
    run_on(&mut vm, ADD_WITH_DEFAULT).unwrap();
    let f = vm.global("f").unwrap();
    assert_eq!(vm.call_value(&f, None, &[Value::Int(5)]).unwrap(), Value::Int(15));
    assert_eq!(
        vm.call_value(&f, None, &[Value::Int(5), Value::Int(1)]).unwrap(),
        Value::Int(6)
    );
}

#[test]
fn default_arguments_from_script() {
    let src = format!(
        "{ADD_WITH_DEFAULT}
load_global f push 5 call 1
load_global f push 5 push 1 call 2
push 100 mul add
return"
    );
    assert_eq!(run(&src).unwrap(), Value::Int(615));
}

#[test]
fn missing_arguments_are_empty() {
    let src = "
.func second 2 a b
    load b return
.end
make_func second push 1 call 1 return
";
    assert_eq!(run(src).unwrap(), Value::Empty);
}

#[test]
fn too_many_arguments_for_the_function() {
    let mut vm = Vm::new();
    run_on(&mut vm, ADD_WITH_DEFAULT).unwrap();
    let f = vm.global("f").unwrap();
    let err = vm
        .call_value(&f, None, &[Value::Int(1), Value::Int(2), Value::Int(3)])
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ArgCount {
            name: "f".into(),
            expected: Arity::range(0, 2),
            got: 3
        }
    );
    assert_eq!(err.to_string(), "f() expects 0 to 2 argument(s), got 3");
}

#[test]
fn argument_limit_is_checked_before_the_body_runs() {
    let src = "
push 0 define runs
.func g 3
    load_global runs incr store_global runs
    return
.end
make_func g define g
load_global g push 1 push 2 push 3 call 3
";
    let mut vm = Vm::with_config(VmConfig {
        max_args: 2,
        ..VmConfig::default()
    });
    let err = run_on(&mut vm, src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgLimit(3));
    assert_eq!(vm.global("runs"), Some(Value::Int(0)));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn recursion_ceiling_after_exactly_max_depth_calls() {
    let src = "
push 0 define count
.func rec 0
    load_global count incr store_global count
    load_global rec call 0
    return
.end
make_func rec define rec
load_global rec call 0
return
";
    let mut vm = Vm::with_config(VmConfig::default().with_max_depth(10));
    let err = run_on(&mut vm, src).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecursionLimit(10));
    assert_eq!(vm.global("count"), Some(Value::Int(10)));
    assert_eq!(vm.depth(), 0);
    assert_eq!(vm.frame_count(), 0);
    // Ten `rec` frames plus the top level.
    assert_eq!(err.backtrace.len(), 11);
}

#[test]
fn recursive_factorial() {
    let src = "
.func fact 1 n
    load n push 1 le jz recurse
    push 1 return
recurse:
    load n
    load_global fact load n push 1 sub call 1
    mul return
.end
make_func fact define fact
load_global fact push 10 call 1 return
";
    assert_eq!(run(src).unwrap(), Value::Int(3_628_800));
}

#[test]
fn method_calls_bind_this() {
    let src = "
.func get 0
    this get_attr v return
.end
new_object
push 41 add_child v
make_func get add_child get
define obj
load_global obj dup get_attr get call_method 0
load_global obj get_attr get call 0
add return
";
    assert_eq!(run(src).unwrap(), Value::Int(82));
}

#[test]
fn free_functions_see_the_globals_as_this() {
    let src = "
push 3 define v
.func get 0
    this get_attr v return
.end
make_func get call 0 return
";
    assert_eq!(run(src).unwrap(), Value::Int(3));
}

#[test]
fn host_can_override_this() {
    let mut vm = Vm::new();
    run_on(&mut vm, ".func get 0 this get_attr v return .end make_func get define get").unwrap();
    let obj = vm.new_object();
    obj.set_member(vm.heap_mut(), "v", Value::Int(12)).unwrap();
    let get = vm.global("get").unwrap();
    assert_eq!(
        vm.call_value(&get, Some(&Value::Object(obj)), &[]).unwrap(),
        Value::Int(12)
    );
}

#[test]
fn frames_are_recycled() {
    let src = "
.func id 1 x
    load x return
.end
make_func id define id
let i
push 0 store i
top:
    load i push 50 ge jnz done
    load_global id load i call 1 store i
    load i incr store i
    jmp top
done:
load i return
";
    let mut vm = Vm::new();
    assert_eq!(run_on(&mut vm, src).unwrap(), Value::Int(50));
    assert_eq!(vm.frame_count(), 0);
    assert_eq!(vm.heap().live(), 1);
}
