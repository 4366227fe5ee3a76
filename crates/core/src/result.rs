//! Core results and error types

use crate::stream::MethodId;
use crate::value::ValueType;
use crate::validator::Violation;
use thiserror::Error;

/// Core error type encompassing all core module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The method identifier does not resolve to a known method.
    #[error("target method not found: {0}")]
    TargetNotFound(MethodId),

    /// The method exists but has no inspectable instruction stream (intrinsic/native).
    #[error("method {0} has no inspectable body")]
    UnsupportedBody(MethodId),

    /// The stream is not structurally well-formed; the live body was left untouched.
    #[error("verification of {method} failed with {} violation(s): {}", .violations.len(), summarize(.violations))]
    VerificationFailed {
        /// Method whose body was rejected.
        method: MethodId,
        /// Every problem the verifier found.
        violations: Vec<Violation>,
    },

    /// Failed to parse assembly at the specified line.
    #[error("assembly parse error at line {line}: {msg} ⇒ `{raw}`")]
    ParseError {
        /// The line number where parsing failed.
        line: usize,
        /// Description of the parsing error.
        msg: String,
        /// The raw content that failed to parse.
        raw: String,
    },

    /// The mnemonic is not part of the opcode table.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    /// The type keyword is not one of `i32`, `i64`, `bool`.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Method identifiers are written `Type::name`.
    #[error("invalid method identifier '{0}', expected Type::name")]
    InvalidMethodId(String),

    /// `call` operands can only be bound by patches, never assembled from text.
    #[error("external '{0}' cannot be bound from assembly")]
    UnboundExternal(String),

    /// An instruction's operands do not fit its opcode.
    #[error("invalid operands for {opcode} at position {position}")]
    InvalidOperands {
        /// Mnemonic of the offending instruction.
        opcode: String,
        /// Position in the stream.
        position: usize,
    },

    /// A branch refers to an instruction that is not in the stream.
    #[error("unresolved label {label} at position {position}")]
    UnresolvedLabel {
        /// Printed form of the dangling label.
        label: String,
        /// Position of the branch.
        position: usize,
    },

    /// Position outside the stream.
    #[error("position {index} out of bounds for stream of length {len}")]
    PositionOutOfBounds {
        /// Requested position.
        index: usize,
        /// Stream length at the time of the request.
        len: usize,
    },

    /// The external binding table is full.
    #[error("too many external bindings in one method")]
    TooManyExternals,

    /// The live body changed between loading a working copy and committing it.
    #[error("live body of {0} changed since it was loaded")]
    StaleBody(MethodId),

    /// A length or index is too large for its field in the byte encoding.
    #[error("{field} ({value}) does not fit the byte encoding")]
    EncodingOverflow {
        /// Which part of the encoding overflowed.
        field: &'static str,
        value: usize,
    },

    /// Wrong number or types of arguments passed to an invocation.
    #[error("argument mismatch for {method}: expected ({expected}), got ({got})")]
    ArgumentMismatch {
        /// Invoked method.
        method: MethodId,
        /// Declared parameter list.
        expected: String,
        /// Supplied argument types.
        got: String,
    },

    /// A runtime operand had the wrong type.
    #[error("type mismatch at position {position}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Position of the failing instruction.
        position: usize,
        /// Expected type description.
        expected: String,
        /// Observed type.
        found: ValueType,
    },

    /// The evaluation stack was empty when a value was required.
    #[error("stack underflow at position {0}")]
    StackUnderflow(usize),

    /// Integer division or remainder by zero.
    #[error("division by zero at position {0}")]
    DivideByZero(usize),

    /// The interpreter exceeded its step budget.
    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(usize),
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
