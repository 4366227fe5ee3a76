//! Opcode table: mnemonics, byte encodings and operand shapes.

use crate::result::Error;
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation performed by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Opcode {
    Nop,
    LdcI4,
    LdcI8,
    LdcBool,
    Ldarg,
    Starg,
    Ldloc,
    Stloc,
    /// Invokes an external value provider and pushes its result.
    Call,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Ceq,
    Clt,
    Cgt,
    And,
    Or,
    Not,
    Dup,
    Pop,
    Br,
    Brtrue,
    Brfalse,
    Ret,
}

/// Shape of the operand an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Immediate(ValueType),
    Label,
    Index,
    External,
}

impl Opcode {
    pub const ALL: [Opcode; 26] = [
        Opcode::Nop,
        Opcode::LdcI4,
        Opcode::LdcI8,
        Opcode::LdcBool,
        Opcode::Ldarg,
        Opcode::Starg,
        Opcode::Ldloc,
        Opcode::Stloc,
        Opcode::Call,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Rem,
        Opcode::Ceq,
        Opcode::Clt,
        Opcode::Cgt,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Dup,
        Opcode::Pop,
        Opcode::Br,
        Opcode::Brtrue,
        Opcode::Brfalse,
        Opcode::Ret,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::LdcI4 => "ldc.i4",
            Opcode::LdcI8 => "ldc.i8",
            Opcode::LdcBool => "ldc.bool",
            Opcode::Ldarg => "ldarg",
            Opcode::Starg => "starg",
            Opcode::Ldloc => "ldloc",
            Opcode::Stloc => "stloc",
            Opcode::Call => "call",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::Ceq => "ceq",
            Opcode::Clt => "clt",
            Opcode::Cgt => "cgt",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Dup => "dup",
            Opcode::Pop => "pop",
            Opcode::Br => "br",
            Opcode::Brtrue => "brtrue",
            Opcode::Brfalse => "brfalse",
            Opcode::Ret => "ret",
        }
    }

    /// Byte used by the binary encoding.
    pub fn to_byte(self) -> u8 {
        // Position in `ALL` is the encoding; keep the table append-only.
        Opcode::ALL
            .iter()
            .position(|op| *op == self)
            .map(|idx| idx as u8)
            .unwrap_or(u8::MAX)
    }

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Opcode::ALL.get(byte as usize).copied()
    }

    pub fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::LdcI4 => OperandKind::Immediate(ValueType::I32),
            Opcode::LdcI8 => OperandKind::Immediate(ValueType::I64),
            Opcode::LdcBool => OperandKind::Immediate(ValueType::Bool),
            Opcode::Ldarg | Opcode::Starg | Opcode::Ldloc | Opcode::Stloc => OperandKind::Index,
            Opcode::Call => OperandKind::External,
            Opcode::Br | Opcode::Brtrue | Opcode::Brfalse => OperandKind::Label,
            _ => OperandKind::None,
        }
    }

    /// Returns true if the opcode transfers control to a label.
    #[inline]
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Brtrue | Opcode::Brfalse)
    }

    /// Returns true if execution never falls through to the next instruction.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Ret)
    }

    /// Returns true if the opcode ends a basic block.
    #[inline]
    pub fn is_block_ending(self) -> bool {
        self.is_branch() || self.is_terminal()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic() == lowered)
            .ok_or_else(|| Error::UnknownOpcode(s.to_string()))
    }
}

impl TryFrom<String> for Opcode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Opcode> for String {
    fn from(op: Opcode) -> Self {
        op.mnemonic().to_string()
    }
}
