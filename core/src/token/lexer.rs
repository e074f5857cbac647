use super::{ParseError, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delim {
    Plus,       // +
    Minus,      // -
    Gt,         // >
    Lt,         // <
    Assign,     // =
    Amp,        // &
    Pipe,       // |
    Dot,        // .
    Bang,       // !
    Semi,       // ;
    Comma,      // ,
    Slash,      // /
    Star,       // *
    Percent,    // %
    Caret,      // ^
    LParen,     // (
    RParen,     // )
    LBracket,   // [
    RBracket,   // ]
    LBrace,     // {
    RBrace,     // }
    Colon,      // :
    Tilde,      // ~
    PlusPlus,   // ++
    MinusMinus, // --
    Shl,        // <<
    Shr,        // >>
    EqEq,       // ==
    AndAnd,     // &&
    OrOr,       // ||
    Le,         // <=
    Ge,         // >=
    Ne,         // !=
}

impl Delim {
    fn single(c: u8) -> Option<Self> {
        Some(match c {
            b'+' => Delim::Plus,
            b'-' => Delim::Minus,
            b'>' => Delim::Gt,
            b'<' => Delim::Lt,
            b'=' => Delim::Assign,
            b'&' => Delim::Amp,
            b'|' => Delim::Pipe,
            b'.' => Delim::Dot,
            b'!' => Delim::Bang,
            b';' => Delim::Semi,
            b',' => Delim::Comma,
            b'/' => Delim::Slash,
            b'*' => Delim::Star,
            b'%' => Delim::Percent,
            b'^' => Delim::Caret,
            b'(' => Delim::LParen,
            b')' => Delim::RParen,
            b'[' => Delim::LBracket,
            b']' => Delim::RBracket,
            b'{' => Delim::LBrace,
            b'}' => Delim::RBrace,
            b':' => Delim::Colon,
            b'~' => Delim::Tilde,
            _ => return None,
        })
    }

    fn double(a: u8, b: u8) -> Option<Self> {
        Some(match (a, b) {
            (b'+', b'+') => Delim::PlusPlus,
            (b'-', b'-') => Delim::MinusMinus,
            (b'<', b'<') => Delim::Shl,
            (b'>', b'>') => Delim::Shr,
            (b'=', b'=') => Delim::EqEq,
            (b'&', b'&') => Delim::AndAnd,
            (b'|', b'|') => Delim::OrOr,
            (b'<', b'=') => Delim::Le,
            (b'>', b'=') => Delim::Ge,
            (b'!', b'=') => Delim::Ne,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Delim::Plus => "+",
            Delim::Minus => "-",
            Delim::Gt => ">",
            Delim::Lt => "<",
            Delim::Assign => "=",
            Delim::Amp => "&",
            Delim::Pipe => "|",
            Delim::Dot => ".",
            Delim::Bang => "!",
            Delim::Semi => ";",
            Delim::Comma => ",",
            Delim::Slash => "/",
            Delim::Star => "*",
            Delim::Percent => "%",
            Delim::Caret => "^",
            Delim::LParen => "(",
            Delim::RParen => ")",
            Delim::LBracket => "[",
            Delim::RBracket => "]",
            Delim::LBrace => "{",
            Delim::RBrace => "}",
            Delim::Colon => ":",
            Delim::Tilde => "~",
            Delim::PlusPlus => "++",
            Delim::MinusMinus => "--",
            Delim::Shl => "<<",
            Delim::Shr => ">>",
            Delim::EqEq => "==",
            Delim::AndAnd => "&&",
            Delim::OrOr => "||",
            Delim::Le => "<=",
            Delim::Ge => ">=",
            Delim::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Append,
    Function,
    Let,
    This,
    Return,
    Break,
}

impl Keyword {
    fn lookup(word: &[u8]) -> Option<Self> {
        Some(match word {
            b"append" => Keyword::Append,
            b"function" => Keyword::Function,
            b"let" => Keyword::Let,
            b"this" => Keyword::This,
            b"return" => Keyword::Return,
            b"break" => Keyword::Break,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    Delim(Delim),
    Keyword(Keyword),
    Ident,
    Str,
    Int,
    Float,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Number {
    #[default]
    None,
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    /// Word for identifiers and keywords, unescaped bytes for strings.
    pub text: Vec<u8>,
    pub num: Number,
}

impl Token {
    /// `text` as UTF-8; empty when it is not valid UTF-8.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.text).unwrap_or("")
    }

    pub fn is_delim(&self, d: Delim) -> bool {
        self.kind == TokenKind::Delim(d)
    }

    /// Identifiers and keywords both spell a word.
    pub fn word(&self) -> Option<&str> {
        matches!(self.kind, TokenKind::Ident | TokenKind::Keyword(_)).then(|| self.text())
    }
}

const ASCII_WHITESPACE: u8 = 1 << 0;
const ASCII_DIGIT: u8 = 1 << 1;
const ASCII_IDENT_START: u8 = 1 << 2;
const ASCII_IDENT_CONT: u8 = 1 << 3;
const ASCII_DELIM: u8 = 1 << 4;

const fn build_ascii_class() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        if matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) {
            table[i] |= ASCII_WHITESPACE;
        }
        if c.is_ascii_digit() {
            table[i] |= ASCII_DIGIT | ASCII_IDENT_CONT;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            table[i] |= ASCII_IDENT_START | ASCII_IDENT_CONT;
        }
        if matches!(
            c,
            b'+' | b'-'
                | b'<'
                | b'>'
                | b'='
                | b'&'
                | b'|'
                | b'.'
                | b'!'
                | b';'
                | b','
                | b'/'
                | b'*'
                | b'%'
                | b'^'
                | b'('
                | b')'
                | b'['
                | b']'
                | b'{'
                | b'}'
                | b':'
                | b'~'
        ) {
            table[i] |= ASCII_DELIM;
        }
        i += 1;
    }
    table
}

const ASCII_CLASS: [u8; 256] = build_ascii_class();

#[inline]
fn has(c: u8, class: u8) -> bool {
    ASCII_CLASS[c as usize] & class != 0
}

pub struct Tokenizer<'a> {
    src: &'a [u8],
    idx: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    /// Split `src` into tokens, ending with a single `Eof`.
    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, ParseError> {
        let mut t = Tokenizer {
            src: src.as_bytes(),
            idx: 0,
            line: 1,
            column: 1,
            tokens: Vec::with_capacity(src.len() / 4),
        };
        t.parse()?;
        Ok(t.tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.idx).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.idx + ahead).copied()
    }

    fn advance(&mut self) {
        if self.peek() == Some(b'\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.idx += 1;
    }

    fn err(&self, msg: &str) -> ParseError {
        ParseError::at(msg, Position::new(self.line, self.column))
    }

    fn push(&mut self, kind: TokenKind, line: u32, text: Vec<u8>, num: Number) {
        self.tokens.push(Token { kind, line, text, num });
    }

    fn parse(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_blank()?;
            let Some(c) = self.peek() else { break };
            if c == b'"' || c == b'\'' {
                self.parse_str()?;
            } else if has(c, ASCII_DIGIT) {
                self.parse_num()?;
            } else if has(c, ASCII_IDENT_START) {
                self.parse_word()?;
            } else if let Some(d) = self.match_delim() {
                let line = self.line;
                let width = d.as_str().len();
                for _ in 0..width {
                    self.advance();
                }
                self.push(TokenKind::Delim(d), line, Vec::new(), Number::None);
            } else {
                return Err(self.err("unrecognized token"));
            }
        }
        let line = self.line;
        self.push(TokenKind::Eof, line, Vec::new(), Number::None);
        Ok(())
    }

    fn skip_blank(&mut self) -> Result<(), ParseError> {
        loop {
            while self.peek().is_some_and(|c| has(c, ASCII_WHITESPACE)) {
                self.advance();
            }
            match (self.peek(), self.peek_at(1)) {
                (Some(b'/'), Some(b'/')) => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.advance();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.err("unterminated comment");
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => self.advance(),
                            (None, _) => return Err(start),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn match_delim(&self) -> Option<Delim> {
        let a = self.peek()?;
        self.peek_at(1)
            .and_then(|b| Delim::double(a, b))
            .or_else(|| Delim::single(a))
    }

    /// A literal or word must end at whitespace, a delimiter or end of input.
    fn at_boundary(&self) -> bool {
        self.peek().is_none_or(|c| has(c, ASCII_WHITESPACE | ASCII_DELIM))
    }

    fn parse_word(&mut self) -> Result<(), ParseError> {
        let line = self.line;
        let start = self.idx;
        while self.peek().is_some_and(|c| has(c, ASCII_IDENT_CONT)) {
            self.advance();
        }
        if !self.at_boundary() {
            return Err(self.err("invalid chars in identifier or keyword"));
        }
        let word = self.src[start..self.idx].to_vec();
        let kind = Keyword::lookup(&word).map_or(TokenKind::Ident, TokenKind::Keyword);
        self.push(kind, line, word, Number::None);
        Ok(())
    }

    fn parse_num(&mut self) -> Result<(), ParseError> {
        let line = self.line;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            return self.parse_hex(line);
        }
        let start = self.idx;
        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some(b'.') {
            is_float = true;
            self.advance();
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            if !self.peek().is_some_and(|c| has(c, ASCII_DIGIT)) {
                return Err(self.err("incomplete exponent"));
            }
            self.eat_digits();
        }
        if !self.at_boundary() {
            return Err(self.err("excess characters after number"));
        }
        // Only ASCII digits, '.', 'e' and signs were consumed.
        let text = std::str::from_utf8(&self.src[start..self.idx]).unwrap_or_default();
        let (kind, num) = if is_float {
            let f = text.parse().map_err(|_| self.err("malformed float literal"))?;
            (TokenKind::Float, Number::Float(f))
        } else {
            let i = text.parse().map_err(|_| self.err("integer literal too large"))?;
            (TokenKind::Int, Number::Int(i))
        };
        self.push(kind, line, Vec::new(), num);
        Ok(())
    }

    fn parse_hex(&mut self, line: u32) -> Result<(), ParseError> {
        self.advance();
        self.advance();
        let start = self.idx;
        while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.advance();
        }
        if start == self.idx {
            return Err(self.err("incorrectly expressed numerical value"));
        }
        if !self.at_boundary() {
            return Err(self.err("excess characters after hex literal"));
        }
        let digits = std::str::from_utf8(&self.src[start..self.idx]).unwrap_or_default();
        let value = u64::from_str_radix(digits, 16).map_err(|_| self.err("hex literal too large"))?;
        self.push(TokenKind::Int, line, Vec::new(), Number::Int(value as i64));
        Ok(())
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| has(c, ASCII_DIGIT)) {
            self.advance();
        }
    }

    fn parse_str(&mut self) -> Result<(), ParseError> {
        let line = self.line;
        let unterminated = self.err("unterminated quote");
        let Some(quote) = self.peek() else {
            return Err(unterminated);
        };
        self.advance();
        let mut out = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(unterminated);
            };
            self.advance();
            if c == quote {
                break;
            }
            if c != b'\\' {
                out.push(c);
                continue;
            }
            let Some(e) = self.peek() else {
                return Err(unterminated);
            };
            match e {
                b'n' | b'r' | b't' | b'\\' | b'\'' | b'"' => {
                    self.advance();
                    out.push(match e {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        other => other,
                    });
                }
                // Escaped end of line joins the next line.
                b'\n' => self.advance(),
                b'\r' if self.peek_at(1) == Some(b'\n') => {
                    self.advance();
                    self.advance();
                }
                b'0'..=b'7' => out.push(self.escape_code(8, 3)?),
                b'x' => {
                    self.advance();
                    out.push(self.escape_code(16, 2)?);
                }
                _ => out.push(b'\\'),
            }
        }
        self.push(TokenKind::Str, line, out, Number::None);
        Ok(())
    }

    /// Read up to `max` digits in `radix` as a single byte.
    fn escape_code(&mut self, radix: u32, max: usize) -> Result<u8, ParseError> {
        let mut value: u32 = 0;
        let mut n = 0;
        while n < max {
            let Some(d) = self.peek().and_then(|c| (c as char).to_digit(radix)) else {
                break;
            };
            value = value * radix + d;
            n += 1;
            self.advance();
        }
        match (n, u8::try_from(value)) {
            (0, _) => Err(self.err("malformed escape sequence")),
            (_, Ok(0)) => Err(self.err("nul character not allowed in string")),
            (_, Ok(b)) => Ok(b),
            (_, Err(_)) => Err(self.err("escape value out of range")),
        }
    }
}
