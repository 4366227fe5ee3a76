//! Instructions and their typed operands.

use crate::opcode::Opcode;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of an instruction inside one stream.
///
/// Positions shift whenever the stream is edited; ids never do, so branch operands refer to ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index into a stream's external binding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternRef(pub(crate) u16);

impl ExternRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Typed instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Immediate(Value),
    Label(InstrId),
    /// Argument or local slot.
    Index(u16),
    External(ExternRef),
}

/// Opcode plus zero or more operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    op: Opcode,
    operands: Vec<Operand>,
}

impl Instruction {
    /// Builds an instruction without checking operand shapes; the verifier reports mismatches.
    pub fn new(op: Opcode, operands: Vec<Operand>) -> Self {
        Self { op, operands }
    }

    /// Instruction without operands (`add`, `ret`, ...).
    pub fn simple(op: Opcode) -> Self {
        Self::new(op, Vec::new())
    }

    pub fn ldc_i4(value: i32) -> Self {
        Self::new(Opcode::LdcI4, vec![Operand::Immediate(Value::I32(value))])
    }

    pub fn ldc_i8(value: i64) -> Self {
        Self::new(Opcode::LdcI8, vec![Operand::Immediate(Value::I64(value))])
    }

    pub fn ldc_bool(value: bool) -> Self {
        Self::new(Opcode::LdcBool, vec![Operand::Immediate(Value::Bool(value))])
    }

    pub fn ldarg(index: u16) -> Self {
        Self::new(Opcode::Ldarg, vec![Operand::Index(index)])
    }

    pub fn starg(index: u16) -> Self {
        Self::new(Opcode::Starg, vec![Operand::Index(index)])
    }

    pub fn ldloc(index: u16) -> Self {
        Self::new(Opcode::Ldloc, vec![Operand::Index(index)])
    }

    pub fn stloc(index: u16) -> Self {
        Self::new(Opcode::Stloc, vec![Operand::Index(index)])
    }

    pub fn call(external: ExternRef) -> Self {
        Self::new(Opcode::Call, vec![Operand::External(external)])
    }

    /// `br`, `brtrue` or `brfalse` to `target`.
    pub fn branch(op: Opcode, target: InstrId) -> Self {
        Self::new(op, vec![Operand::Label(target)])
    }

    #[inline]
    pub fn op(&self) -> Opcode {
        self.op
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn immediate(&self) -> Option<Value> {
        match self.operands.first() {
            Some(Operand::Immediate(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<InstrId> {
        match self.operands.first() {
            Some(Operand::Label(target)) => Some(*target),
            _ => None,
        }
    }

    pub fn slot(&self) -> Option<u16> {
        match self.operands.first() {
            Some(Operand::Index(index)) => Some(*index),
            _ => None,
        }
    }

    pub fn external(&self) -> Option<ExternRef> {
        match self.operands.first() {
            Some(Operand::External(ext)) => Some(*ext),
            _ => None,
        }
    }

    #[inline]
    pub fn match_opcode(&self, op: Opcode) -> bool {
        self.op == op
    }

    /// True for `ldc.i4 value`.
    pub fn match_ldc_i4(&self, value: i32) -> bool {
        self.op == Opcode::LdcI4 && self.immediate() == Some(Value::I32(value))
    }

    /// True for `ldarg index`.
    pub fn match_ldarg(&self, index: u16) -> bool {
        self.op == Opcode::Ldarg && self.slot() == Some(index)
    }

    /// Rewrites every label operand pointing at `from` so it points at `to`.
    pub(crate) fn retarget(&mut self, from: InstrId, to: InstrId) -> bool {
        let mut changed = false;
        for operand in &mut self.operands {
            if let Operand::Label(target) = operand
                && *target == from
            {
                *target = to;
                changed = true;
            }
        }
        changed
    }

    pub(crate) fn set_operands(&mut self, operands: Vec<Operand>) {
        self.operands = operands;
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        for operand in &self.operands {
            match operand {
                Operand::Immediate(value) => write!(f, " {value}")?,
                Operand::Label(target) => write!(f, " {target}")?,
                Operand::Index(index) => write!(f, " {index}")?,
                Operand::External(ext) => write!(f, " ext{}", ext.0)?,
            }
        }
        Ok(())
    }
}
