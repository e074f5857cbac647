//! Source tokenizer.

mod error;
mod lexer;

pub use error::{ParseError, Position};
pub use lexer::{Delim, Keyword, Number, Token, TokenKind, Tokenizer};
