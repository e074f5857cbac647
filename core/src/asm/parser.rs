use std::rc::Rc;

use tracing::debug;

use crate::{
    op::{BinOp, UnaryOp},
    token::{Delim, Number, ParseError, Token, TokenKind},
    util::fast_map::{FastHashMap, fast_hash_map_new},
    vm::{Executable, Op},
};

use super::{ExecutableBuilder, Label};

/// Name of the executable holding top-level instructions.
pub const MAIN_NAME: &str = "main";

/// Assemble a token stream into the top-level executable of `file`.
pub fn assemble(file: &str, tokens: &[Token]) -> Result<Rc<Executable>, ParseError> {
    if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
        return Err(ParseError::new("token stream does not end in eof").in_file(file));
    }
    let mut asm = Assembler {
        file,
        tokens,
        pos: 0,
        funcs: fast_hash_map_new(),
        main: Unit::new(MAIN_NAME, file, 0),
        current: None,
    };
    asm.run().map_err(|e| e.in_file(file))
}

/// Per-executable assembly state.
struct Unit {
    builder: ExecutableBuilder,
    labels: FastHashMap<String, Label>,
    locals: FastHashMap<String, u16>,
    nlocals: u16,
}

impl Unit {
    fn new(name: &str, file: &str, nparams: u16) -> Self {
        Self {
            builder: ExecutableBuilder::new(name, file, nparams),
            labels: fast_hash_map_new(),
            locals: fast_hash_map_new(),
            nlocals: nparams,
        }
    }

    fn label(&mut self, name: &str) -> Label {
        if let Some(l) = self.labels.get(name) {
            return *l;
        }
        let l = self.builder.label();
        self.labels.insert(name.to_string(), l);
        l
    }

    fn finish(self) -> Result<Rc<Executable>, ParseError> {
        for (name, label) in &self.labels {
            if !self.builder.is_bound(*label) {
                return Err(ParseError::new(format!("{}: undefined label `{name}`", self.builder.name())));
            }
        }
        self.builder.finish()
    }
}

struct Assembler<'a> {
    file: &'a str,
    tokens: &'a [Token],
    pos: usize,
    funcs: FastHashMap<String, Rc<Executable>>,
    main: Unit,
    current: Option<Unit>,
}

impl<'a> Assembler<'a> {
    fn run(&mut self) -> Result<Rc<Executable>, ParseError> {
        let mut count = 0usize;
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Delim(Delim::Dot) => self.directive(tok.line)?,
                TokenKind::Ident | TokenKind::Keyword(_) if self.peek().is_delim(Delim::Colon) => {
                    self.pos += 1;
                    let unit = self.unit();
                    let label = unit.label(tok.text());
                    if unit.builder.is_bound(label) {
                        return Err(ParseError::at_line(format!("duplicate label `{}`", tok.text()), tok.line));
                    }
                    unit.builder.bind(label);
                }
                TokenKind::Ident | TokenKind::Keyword(_) => {
                    self.instruction(tok)?;
                    count += 1;
                }
                _ => return Err(ParseError::at_line("expected an instruction", tok.line)),
            }
        }
        if let Some(unit) = &self.current {
            return Err(ParseError::new(format!("function `{}` is missing `.end`", unit.builder.name())));
        }
        let main = std::mem::replace(&mut self.main, Unit::new(MAIN_NAME, self.file, 0));
        let exec = main.finish()?;
        debug!(target: "candy::asm", file = self.file, functions = self.funcs.len(), instructions = count, "assembled");
        Ok(exec)
    }

    fn next(&mut self) -> &'a Token {
        let tokens = self.tokens;
        let tok = &tokens[self.pos.min(tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn peek(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[self.pos.min(tokens.len() - 1)]
    }

    fn unit(&mut self) -> &mut Unit {
        self.current.as_mut().unwrap_or(&mut self.main)
    }

    fn directive(&mut self, line: u32) -> Result<(), ParseError> {
        let tok = self.next();
        match tok.word() {
            Some("func") => {
                if self.current.is_some() {
                    return Err(ParseError::at_line("functions cannot nest", line));
                }
                let name = self.word()?;
                let nparams = self.index("parameter count")?;
                let mut unit = Unit::new(name, self.file, nparams);
                // Parameter names may follow on the same line.
                let mut param = 0u16;
                while param < nparams && self.peek().kind == TokenKind::Ident && self.peek().line == line {
                    unit.locals.insert(self.next().text().to_string(), param);
                    param += 1;
                }
                self.current = Some(unit);
                Ok(())
            }
            Some("end") => {
                let Some(unit) = self.current.take() else {
                    return Err(ParseError::at_line("`.end` outside a function", line));
                };
                let name = unit.builder.name().to_string();
                let exec = unit.finish()?;
                self.funcs.insert(name, exec);
                Ok(())
            }
            _ => Err(ParseError::at_line(format!("unknown directive `.{}`", tok.text()), line)),
        }
    }

    fn word(&mut self) -> Result<&'a str, ParseError> {
        let tok = self.next();
        tok.word()
            .ok_or_else(|| ParseError::at_line("expected a name", tok.line))
    }

    /// A name operand; string literals are accepted too.
    fn name(&mut self) -> Result<String, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Ident | TokenKind::Keyword(_) | TokenKind::Str => Ok(tok.text().to_string()),
            _ => Err(ParseError::at_line("expected a name", tok.line)),
        }
    }

    fn index(&mut self, what: &str) -> Result<u16, ParseError> {
        let tok = self.next();
        match tok.num {
            Number::Int(i) if tok.kind == TokenKind::Int => {
                u16::try_from(i).map_err(|_| ParseError::at_line(format!("{what} {i} out of range"), tok.line))
            }
            _ => Err(ParseError::at_line(format!("expected {what}"), tok.line)),
        }
    }

    fn argc(&mut self) -> Result<u8, ParseError> {
        let line = self.peek().line;
        let n = self.index("argument count")?;
        u8::try_from(n).map_err(|_| ParseError::at_line(format!("argument count {n} out of range"), line))
    }

    /// A local index or a name bound by `let NAME` or a parameter list.
    fn local(&mut self) -> Result<u16, ParseError> {
        if self.peek().kind == TokenKind::Int {
            return self.index("local index");
        }
        let tok = self.next();
        let found = tok.word().and_then(|w| self.unit().locals.get(w).copied());
        found.ok_or_else(|| ParseError::at_line(format!("unknown local `{}`", tok.text()), tok.line))
    }

    fn literal(&mut self, line: u32) -> Result<(), ParseError> {
        let negate = self.peek().is_delim(Delim::Minus);
        if negate {
            self.pos += 1;
        }
        let tok = self.next();
        let b = &mut self.unit().builder;
        match (tok.kind, tok.num) {
            (TokenKind::Int, Number::Int(i)) => {
                b.push_int(if negate { i.wrapping_neg() } else { i });
            }
            (TokenKind::Float, Number::Float(f)) => {
                b.push_float(if negate { -f } else { f });
            }
            (TokenKind::Str, _) if !negate => {
                b.push_str(tok.text());
            }
            _ => return Err(ParseError::at_line("expected a literal", line)),
        }
        Ok(())
    }

    fn instruction(&mut self, tok: &'a Token) -> Result<(), ParseError> {
        let line = tok.line;
        self.unit().builder.set_line(line);
        let mnemonic = tok.text();
        if let Some(op) = simple_op(mnemonic) {
            self.unit().builder.emit(op);
            return Ok(());
        }
        let named: Option<fn(u16) -> Op> = match mnemonic {
            "load_global" => Some(Op::LoadGlobal),
            "store_global" => Some(Op::StoreGlobal),
            "define" => Some(Op::DefineGlobal),
            "get_attr" => Some(Op::GetAttr),
            "set_attr" => Some(Op::SetAttr),
            "add_child" => Some(Op::AddChild),
            _ => None,
        };
        if let Some(op) = named {
            let name = self.name()?;
            self.unit().builder.emit_named(op, &name);
            return Ok(());
        }
        let local: Option<fn(u16) -> Op> = match mnemonic {
            "load" => Some(Op::LoadLocal),
            "store" => Some(Op::StoreLocal),
            "ref" => Some(Op::LocalRef),
            _ => None,
        };
        if let Some(op) = local {
            let n = self.local()?;
            self.unit().builder.emit(op(n));
            return Ok(());
        }
        match mnemonic {
            "push" => self.literal(line)?,
            "let" => {
                let name = (self.peek().kind == TokenKind::Ident && self.peek().line == line).then(|| self.next());
                let unit = self.unit();
                if let Some(name) = name {
                    unit.locals.insert(name.text().to_string(), unit.nlocals);
                }
                unit.nlocals = unit.nlocals.saturating_add(1);
                unit.builder.emit(Op::DeclareLocal);
            }
            "load_clo" | "store_clo" | "ref_clo" => {
                let n = self.index("closure index")?;
                let op = match mnemonic {
                    "load_clo" => Op::LoadClosure(n),
                    "store_clo" => Op::StoreClosure(n),
                    _ => Op::ClosureRef(n),
                };
                self.unit().builder.emit(op);
            }
            "make_func" => {
                let name = self.word()?;
                let Some(body) = self.funcs.get(name).cloned() else {
                    return Err(ParseError::at_line(format!("function `{name}` is not defined yet"), line));
                };
                self.unit().builder.make_function(body);
            }
            "add_default" => {
                let n = self.index("parameter index")?;
                self.unit().builder.emit(Op::AddDefault(n));
            }
            "jmp" | "jz" | "jnz" => {
                let target = self.word()?;
                let unit = self.unit();
                let label = unit.label(target);
                match mnemonic {
                    "jmp" => unit.builder.jump(label),
                    "jz" => unit.builder.jump_if_false(label),
                    _ => unit.builder.jump_if_true(label),
                };
            }
            "call" => {
                let n = self.argc()?;
                self.unit().builder.emit(Op::Call(n));
            }
            "call_method" => {
                let n = self.argc()?;
                self.unit().builder.emit(Op::CallMethod(n));
            }
            _ => return Err(ParseError::at_line(format!("unknown instruction `{mnemonic}`"), line)),
        }
        Ok(())
    }
}

/// Mnemonics without operands.
fn simple_op(mnemonic: &str) -> Option<Op> {
    Some(match mnemonic {
        "nop" => Op::Nop,
        "push_empty" => Op::PushEmpty,
        "pop" => Op::Pop,
        "dup" => Op::Dup,
        "this" => Op::LoadThis,
        "get_index" => Op::GetIndex,
        "set_index" => Op::SetIndex,
        "new_object" => Op::MakeObject,
        "new_array" => Op::MakeArray,
        "append" => Op::ArrayAppend,
        "add_closure" => Op::AddClosure,
        "add" => Op::Binary(BinOp::Add),
        "sub" => Op::Binary(BinOp::Sub),
        "mul" => Op::Binary(BinOp::Mul),
        "div" => Op::Binary(BinOp::Div),
        "mod" => Op::Binary(BinOp::Mod),
        "eq" => Op::Binary(BinOp::Eq),
        "ne" => Op::Binary(BinOp::Ne),
        "lt" => Op::Binary(BinOp::Lt),
        "le" => Op::Binary(BinOp::Le),
        "gt" => Op::Binary(BinOp::Gt),
        "ge" => Op::Binary(BinOp::Ge),
        "shl" => Op::Binary(BinOp::Shl),
        "shr" => Op::Binary(BinOp::Shr),
        "and" => Op::Binary(BinOp::BitAnd),
        "or" => Op::Binary(BinOp::BitOr),
        "xor" => Op::Binary(BinOp::Xor),
        "land" => Op::Binary(BinOp::LogAnd),
        "lor" => Op::Binary(BinOp::LogOr),
        "neg" => Op::Unary(UnaryOp::Neg),
        "not" => Op::Unary(UnaryOp::Not),
        "bitnot" => Op::Unary(UnaryOp::BitNot),
        "incr" => Op::Incr,
        "decr" => Op::Decr,
        "return" => Op::Return,
        "end" => Op::End,
        _ => return None,
    })
}
