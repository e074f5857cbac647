pub(super) use crate::{
    asm::assemble_source,
    error::{ErrorKind, VmError, VmResult},
    val::{Arity, Value},
    vm::{Vm, VmConfig},
};

pub(super) fn run_on(vm: &mut Vm, src: &str) -> VmResult<Value> {
    let exec = assemble_source("t.cdy", src).unwrap();
    vm.execute(&exec)
}

pub(super) fn run(src: &str) -> VmResult<Value> {
    run_on(&mut Vm::new(), src)
}

mod basics;
mod calls;
mod closures;
mod errors;
mod natives;
