use std::rc::Rc;

use crate::{
    token::ParseError,
    util::fast_map::{FastHashMap, fast_hash_map_new},
    vm::{Constant, Executable, Instruction, Op},
};

/// A jump target, bound to an instruction index with [`ExecutableBuilder::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum JumpKind {
    Always,
    IfFalse,
    IfTrue,
}

/// Incremental construction of an [`Executable`].
///
/// Constants are deduplicated; jumps may target labels bound later and are
/// patched by [`finish`](Self::finish).
#[derive(Debug)]
pub struct ExecutableBuilder {
    name: Rc<str>,
    file: Rc<str>,
    nparams: u16,
    line: u32,
    code: Vec<Instruction>,
    consts: Vec<Constant>,
    strs: FastHashMap<Rc<str>, u16>,
    ints: FastHashMap<i64, u16>,
    floats: FastHashMap<u64, u16>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label, JumpKind)>,
    too_many_consts: bool,
}

impl ExecutableBuilder {
    pub fn new(name: &str, file: &str, nparams: u16) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            nparams,
            line: 0,
            code: Vec::new(),
            consts: Vec::new(),
            strs: fast_hash_map_new(),
            ints: fast_hash_map_new(),
            floats: fast_hash_map_new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            too_many_consts: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source line recorded on instructions emitted from now on.
    pub fn set_line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn emit(&mut self, op: Op) -> &mut Self {
        self.code.push(Instruction { op, line: self.line });
        self
    }

    fn add_const(&mut self, c: Constant) -> u16 {
        match u16::try_from(self.consts.len()) {
            Ok(idx) => {
                self.consts.push(c);
                idx
            }
            Err(_) => {
                self.too_many_consts = true;
                u16::MAX
            }
        }
    }

    /// Index of the string constant `s`, added on first use.
    pub fn str_const(&mut self, s: &str) -> u16 {
        if let Some(idx) = self.strs.get(s) {
            return *idx;
        }
        let s: Rc<str> = s.into();
        let idx = self.add_const(Constant::Str(s.clone()));
        self.strs.insert(s, idx);
        idx
    }

    pub fn int_const(&mut self, i: i64) -> u16 {
        if let Some(idx) = self.ints.get(&i) {
            return *idx;
        }
        let idx = self.add_const(Constant::Int(i));
        self.ints.insert(i, idx);
        idx
    }

    pub fn float_const(&mut self, f: f64) -> u16 {
        if let Some(idx) = self.floats.get(&f.to_bits()) {
            return *idx;
        }
        let idx = self.add_const(Constant::Float(f));
        self.floats.insert(f.to_bits(), idx);
        idx
    }

    pub fn push_int(&mut self, i: i64) -> &mut Self {
        let k = self.int_const(i);
        self.emit(Op::PushConst(k))
    }

    pub fn push_float(&mut self, f: f64) -> &mut Self {
        let k = self.float_const(f);
        self.emit(Op::PushConst(k))
    }

    pub fn push_str(&mut self, s: &str) -> &mut Self {
        let k = self.str_const(s);
        self.emit(Op::PushConst(k))
    }

    /// Push `body` and turn it into a fresh function value.
    pub fn make_function(&mut self, body: Rc<Executable>) -> &mut Self {
        let k = self.add_const(Constant::Exec(body));
        self.emit(Op::PushConst(k)).emit(Op::MakeFunction)
    }

    /// Emit an instruction taking a name operand, such as `Op::GetAttr`.
    pub fn emit_named(&mut self, op: fn(u16) -> Op, name: &str) -> &mut Self {
        let k = self.str_const(name);
        self.emit(op(k))
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Point `label` at the next instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let here = self.code.len() as u32;
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(here);
        }
        self
    }

    pub fn is_bound(&self, label: Label) -> bool {
        matches!(self.labels.get(label.0), Some(Some(_)))
    }

    fn emit_jump(&mut self, label: Label, kind: JumpKind) -> &mut Self {
        self.fixups.push((self.code.len(), label, kind));
        self.emit(Op::Nop)
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.emit_jump(label, JumpKind::Always)
    }

    pub fn jump_if_false(&mut self, label: Label) -> &mut Self {
        self.emit_jump(label, JumpKind::IfFalse)
    }

    pub fn jump_if_true(&mut self, label: Label) -> &mut Self {
        self.emit_jump(label, JumpKind::IfTrue)
    }

    /// Resolve jumps and freeze the executable.
    pub fn finish(self) -> Result<Rc<Executable>, ParseError> {
        if self.too_many_consts {
            return Err(ParseError::new(format!("{}: too many constants", self.name)).in_file(&self.file));
        }
        let mut code = self.code;
        for (at, label, kind) in self.fixups {
            let Some(Some(target)) = self.labels.get(label.0).copied() else {
                let line = code.get(at).map_or(0, |ins| ins.line);
                return Err(ParseError::at_line(format!("{}: jump to an unbound label", self.name), line)
                    .in_file(&self.file));
            };
            code[at].op = match kind {
                JumpKind::Always => Op::Jump(target),
                JumpKind::IfFalse => Op::JumpIfFalse(target),
                JumpKind::IfTrue => Op::JumpIfTrue(target),
            };
        }
        Ok(Rc::new(Executable {
            name: self.name,
            file: self.file,
            nparams: self.nparams,
            code,
            consts: self.consts,
        }))
    }
}
