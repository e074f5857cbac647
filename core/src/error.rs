use std::fmt;

use thiserror::Error;

use crate::val::Arity;

/// Abort on a broken runtime invariant.
///
/// These are defects in the runtime itself, never script errors, so they are
/// not returned to the host.
#[macro_export]
macro_rules! bug {
    ($($arg:tt)*) => {
        panic!("candy internal error at {}:{}: {}", file!(), line!(), format_args!($($arg)*))
    };
}

/// `bug!` when `cond` holds.
#[macro_export]
macro_rules! bug_on {
    ($cond:expr) => {
        if $cond {
            $crate::bug!("assertion `{}` tripped", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if $cond {
            $crate::bug!($($arg)*);
        }
    };
}

/// Everything a script can do wrong.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("{name}() expects {expected} argument(s), got {got}")]
    ArgCount { name: String, expected: Arity, got: usize },
    #[error("too many arguments: {0} exceeds the call limit")]
    ArgLimit(usize),
    #[error("too many closure captures: limit is {0}")]
    ClosureLimit(usize),
    #[error("invalid operands for '{op}': {lhs} and {rhs}")]
    InvalidOperands {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("invalid operand for '{op}': {operand}")]
    InvalidOperand { op: &'static str, operand: &'static str },
    #[error("cannot assign {from} to {to}")]
    IncompatibleAssign { to: &'static str, from: &'static str },
    #[error("division by zero")]
    DivideByZero,
    #[error("invalid shift count {0}")]
    BadShift(i64),
    #[error("array holds {expected} elements, cannot add {got}")]
    ArrayType { expected: &'static str, got: &'static str },
    #[error("value already belongs to another container")]
    AlreadyLinked,
    #[error("adding this value would create a reference cycle")]
    Cycle,
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("maximum recursion depth ({0}) exceeded")]
    RecursionLimit(usize),
    #[error("operand stack overflow ({0} slots)")]
    StackOverflow(usize),
    #[error("undefined symbol '{0}'")]
    Undefined(String),
    #[error("{0} is not callable")]
    NotCallable(&'static str),
    #[error("{kind} has no member '{name}'")]
    NoSuchMember { kind: &'static str, name: String },
    #[error("cannot index {container} with {index}")]
    NotIndexable {
        container: &'static str,
        index: &'static str,
    },
    #[error("malformed code: {0}")]
    MalformedCode(String),
    #[error("{0}")]
    Native(String),
}

/// Source position of the instruction that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A script error as reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub kind: ErrorKind,
    pub location: Option<Location>,
    /// Innermost frame first.
    pub backtrace: Vec<String>,
}

impl VmError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
            backtrace: Vec::new(),
        }
    }

    pub fn native(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Native(msg.into()))
    }

    pub fn is_located(&self) -> bool {
        self.location.is_some()
    }
}

impl From<ErrorKind> for VmError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: {}", self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }
        for entry in &self.backtrace {
            write!(f, "\n    at {entry}")?;
        }
        Ok(())
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

pub type OpResult<T> = Result<T, ErrorKind>;
pub type VmResult<T> = Result<T, VmError>;
