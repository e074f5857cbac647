//! Stack virtual machine.
//!
//! Executables are immutable instruction lists produced by the assembler.
//! The [`Vm`] owns the value pool, the global object and the frame chain, and
//! runs one executable at a time; natives may re-enter it through
//! [`Vm::call_value`].

mod bytecode;
mod config;
#[allow(clippy::module_inception)]
mod vm;

pub use bytecode::{Constant, Executable, Instruction, Op};
pub use config::{FRAME_ARG_MAX, FRAME_CLOSURE_MAX, FRAME_STACK_MAX, RECURSION_MAX, VmConfig};
pub use vm::Vm;

#[cfg(test)]
mod vm_test;
