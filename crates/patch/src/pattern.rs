//! Instruction predicates used to locate patch sites.
//!
//! A matcher looks at one instruction at a time and never mutates anything. Any
//! `Fn(&Instruction) -> bool` closure is a matcher; the builders below cover the common cases and
//! compose with [`Matcher::and`], [`Matcher::or`] and [`Matcher::not`]. [`MatchRule`] is the same
//! vocabulary as data, so plans loaded from JSON can describe their patch sites.

use ilweave_core::{Instruction, Opcode, Value};
use serde::{Deserialize, Serialize};

/// Pure predicate over a single instruction.
pub trait Matcher {
    fn matches(&self, instruction: &Instruction) -> bool;

    /// Matches when both `self` and `other` match.
    fn and<M: Matcher>(self, other: M) -> And<Self, M>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// Matches when either `self` or `other` matches.
    fn or<M: Matcher>(self, other: M) -> Or<Self, M>
    where
        Self: Sized,
    {
        Or(self, other)
    }

    /// Matches when `self` does not.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }
}

impl<F> Matcher for F
where
    F: Fn(&Instruction) -> bool,
{
    fn matches(&self, instruction: &Instruction) -> bool {
        self(instruction)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct And<A, B>(A, B);

impl<A: Matcher, B: Matcher> Matcher for And<A, B> {
    fn matches(&self, instruction: &Instruction) -> bool {
        self.0.matches(instruction) && self.1.matches(instruction)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Or<A, B>(A, B);

impl<A: Matcher, B: Matcher> Matcher for Or<A, B> {
    fn matches(&self, instruction: &Instruction) -> bool {
        self.0.matches(instruction) || self.1.matches(instruction)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Not<A>(A);

impl<A: Matcher> Matcher for Not<A> {
    fn matches(&self, instruction: &Instruction) -> bool {
        !self.0.matches(instruction)
    }
}

/// Matches any instruction with opcode `op`, regardless of operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeIs(pub Opcode);

impl Matcher for OpcodeIs {
    fn matches(&self, instruction: &Instruction) -> bool {
        instruction.match_opcode(self.0)
    }
}

/// Matches an immediate load of exactly `value` (type included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadsConstant(pub Value);

impl Matcher for LoadsConstant {
    fn matches(&self, instruction: &Instruction) -> bool {
        instruction.immediate() == Some(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anything;

impl Matcher for Anything {
    fn matches(&self, _instruction: &Instruction) -> bool {
        true
    }
}

pub fn opcode(op: Opcode) -> OpcodeIs {
    OpcodeIs(op)
}

/// `ldc.i4 value`
pub fn ldc_i4(value: i32) -> LoadsConstant {
    LoadsConstant(Value::I32(value))
}

pub fn ldc_i8(value: i64) -> LoadsConstant {
    LoadsConstant(Value::I64(value))
}

pub fn constant(value: Value) -> LoadsConstant {
    LoadsConstant(value)
}

/// `ldarg index`
pub fn ldarg(index: u16) -> impl Matcher + Copy {
    move |instruction: &Instruction| instruction.match_ldarg(index)
}

pub fn any() -> Anything {
    Anything
}

/// Serializable description of a matcher.
///
/// ```json
/// { "kind": "and", "rules": [
///     { "kind": "opcode", "opcode": "ldc.i4" },
///     { "kind": "not", "rule": { "kind": "ldc_i4", "value": 0 } }
/// ] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRule {
    Any,
    Opcode { opcode: Opcode },
    LdcI4 { value: i32 },
    Constant { value: Value },
    Ldarg { index: u16 },
    And { rules: Vec<MatchRule> },
    Or { rules: Vec<MatchRule> },
    Not { rule: Box<MatchRule> },
}

impl Matcher for MatchRule {
    fn matches(&self, instruction: &Instruction) -> bool {
        match self {
            MatchRule::Any => true,
            MatchRule::Opcode { opcode } => instruction.match_opcode(*opcode),
            MatchRule::LdcI4 { value } => instruction.match_ldc_i4(*value),
            MatchRule::Constant { value } => instruction.immediate() == Some(*value),
            MatchRule::Ldarg { index } => instruction.match_ldarg(*index),
            MatchRule::And { rules } => rules.iter().all(|rule| rule.matches(instruction)),
            MatchRule::Or { rules } => rules.iter().any(|rule| rule.matches(instruction)),
            MatchRule::Not { rule } => !rule.matches(instruction),
        }
    }
}
