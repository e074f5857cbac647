//! Assembly listing front end.
//!
//! A listing is a top-level body plus function blocks:
//!
//! ```text
//! .func add 2 a b      // name, parameter count, optional parameter names
//!     load a
//!     load b
//!     add
//!     return
//! .end
//!
//! make_func add
//! define add
//! load_global add
//! push 2
//! push 3
//! call 2
//! return
//! ```
//!
//! `name:` binds a label for `jmp`, `jz` and `jnz`. `let NAME` declares a
//! local; `load`, `store` and `ref` take a local name or index. A function
//! must be defined before `make_func` refers to it.

mod builder;
mod parser;

pub use builder::{ExecutableBuilder, Label};
pub use parser::{MAIN_NAME, assemble};

use std::rc::Rc;

use crate::{
    token::{ParseError, Tokenizer},
    vm::Executable,
};

/// Tokenize and assemble `src`.
pub fn assemble_source(file: &str, src: &str) -> Result<Rc<Executable>, ParseError> {
    let tokens = Tokenizer::tokenize(src).map_err(|e| e.in_file(file))?;
    assemble(file, &tokens)
}
