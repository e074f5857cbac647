pub mod asm;
pub mod error;
pub mod module;
pub mod op;
pub mod token;
pub mod util;
pub mod val;
pub mod vm;

pub use error::{ErrorKind, Location, OpResult, VmError, VmResult};
pub use val::Value;
pub use vm::{Vm, VmConfig};
