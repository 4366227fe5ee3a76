//! Stack interpreter for verified method bodies.
//!
//! External providers are called when their `call` executes, so every invocation observes the
//! provider's value at that moment.

use crate::opcode::Opcode;
use crate::result::{Error, Result};
use crate::stream::InstructionStream;
use crate::value::{Value, ValueType};

/// Upper bound on executed instructions per invocation.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Executes `stream` with `args` and returns the value left by `ret` (None for void methods).
pub fn execute(stream: &InstructionStream, args: &[Value]) -> Result<Option<Value>> {
    execute_with_limit(stream, args, DEFAULT_STEP_LIMIT)
}

pub fn execute_with_limit(
    stream: &InstructionStream,
    args: &[Value],
    step_limit: usize,
) -> Result<Option<Value>> {
    let signature = stream.signature();
    let arg_types: Vec<ValueType> = args.iter().map(Value::value_type).collect();
    if arg_types != signature.params {
        return Err(Error::ArgumentMismatch {
            method: stream.method().clone(),
            expected: join(&signature.params),
            got: join(&arg_types),
        });
    }

    let positions = stream.positions();
    let mut params = args.to_vec();
    let mut locals: Vec<Value> = signature
        .locals
        .iter()
        .map(|ty| ty.default_value())
        .collect();
    let mut stack: Vec<Value> = Vec::with_capacity(8);
    let mut pc = 0usize;
    let mut steps = 0usize;

    loop {
        let Some(instruction) = stream.get(pc) else {
            // Verified bodies never fall off the end.
            return Err(Error::PositionOutOfBounds {
                index: pc,
                len: stream.len(),
            });
        };
        steps += 1;
        if steps > step_limit {
            return Err(Error::StepLimitExceeded(step_limit));
        }

        let mut next = pc + 1;
        let mut pop = || stack.pop().ok_or(Error::StackUnderflow(pc));
        match instruction.op() {
            Opcode::Nop => {}
            Opcode::LdcI4 | Opcode::LdcI8 | Opcode::LdcBool => {
                let value = instruction.immediate().ok_or(Error::InvalidOperands {
                    opcode: instruction.op().to_string(),
                    position: pc,
                })?;
                stack.push(value);
            }
            Opcode::Ldarg => stack.push(*slot(&mut params, instruction, pc)?),
            Opcode::Starg => {
                let value = pop()?;
                *slot(&mut params, instruction, pc)? = value;
            }
            Opcode::Ldloc => stack.push(*slot(&mut locals, instruction, pc)?),
            Opcode::Stloc => {
                let value = pop()?;
                *slot(&mut locals, instruction, pc)? = value;
            }
            Opcode::Call => {
                let binding = instruction
                    .external()
                    .and_then(|ext| stream.external(ext))
                    .ok_or(Error::InvalidOperands {
                        opcode: instruction.op().to_string(),
                        position: pc,
                    })?;
                let value = binding.source().current_value();
                if value.value_type() != binding.value_type() {
                    return Err(Error::TypeMismatch {
                        position: pc,
                        expected: binding.value_type().to_string(),
                        found: value.value_type(),
                    });
                }
                stack.push(value);
            }
            op @ (Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Rem) => {
                let rhs = pop()?;
                let lhs = pop()?;
                stack.push(arith(op, lhs, rhs, pc)?);
            }
            op @ (Opcode::Ceq | Opcode::Clt | Opcode::Cgt) => {
                let rhs = pop()?;
                let lhs = pop()?;
                stack.push(Value::Bool(compare(op, lhs, rhs, pc)?));
            }
            op @ (Opcode::And | Opcode::Or) => {
                let rhs = pop()?;
                let lhs = pop()?;
                stack.push(bitwise(op, lhs, rhs, pc)?);
            }
            Opcode::Not => {
                let value = match pop()? {
                    Value::I32(v) => Value::I32(!v),
                    Value::I64(v) => Value::I64(!v),
                    Value::Bool(v) => Value::Bool(!v),
                };
                stack.push(value);
            }
            Opcode::Dup => {
                let value = pop()?;
                stack.push(value);
                stack.push(value);
            }
            Opcode::Pop => {
                pop()?;
            }
            Opcode::Br => next = jump_target(stream, &positions, pc)?,
            Opcode::Brtrue => {
                if pop()?.is_truthy() {
                    next = jump_target(stream, &positions, pc)?;
                }
            }
            Opcode::Brfalse => {
                if !pop()?.is_truthy() {
                    next = jump_target(stream, &positions, pc)?;
                }
            }
            Opcode::Ret => {
                return match signature.returns {
                    Some(_) => pop().map(Some),
                    None => Ok(None),
                };
            }
        }
        pc = next;
    }
}

/// The argument or local `instruction` addresses. Unverified bodies may name a slot that does
/// not exist.
fn slot<'v>(
    values: &'v mut [Value],
    instruction: &crate::instruction::Instruction,
    pc: usize,
) -> Result<&'v mut Value> {
    instruction
        .slot()
        .and_then(|index| values.get_mut(usize::from(index)))
        .ok_or(Error::InvalidOperands {
            opcode: instruction.op().to_string(),
            position: pc,
        })
}

fn jump_target(
    stream: &InstructionStream,
    positions: &std::collections::HashMap<crate::instruction::InstrId, usize>,
    pc: usize,
) -> Result<usize> {
    let label = stream.get(pc).and_then(|i| i.label());
    label
        .and_then(|target| positions.get(&target).copied())
        .ok_or_else(|| Error::UnresolvedLabel {
            label: label.map(|l| l.to_string()).unwrap_or_default(),
            position: pc,
        })
}

fn arith(op: Opcode, lhs: Value, rhs: Value, pc: usize) -> Result<Value> {
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => {
            if matches!(op, Opcode::Div | Opcode::Rem) && b == 0 {
                return Err(Error::DivideByZero(pc));
            }
            Ok(Value::I32(match op {
                Opcode::Add => a.wrapping_add(b),
                Opcode::Sub => a.wrapping_sub(b),
                Opcode::Mul => a.wrapping_mul(b),
                Opcode::Div => a.wrapping_div(b),
                _ => a.wrapping_rem(b),
            }))
        }
        (Value::I64(a), Value::I64(b)) => {
            if matches!(op, Opcode::Div | Opcode::Rem) && b == 0 {
                return Err(Error::DivideByZero(pc));
            }
            Ok(Value::I64(match op {
                Opcode::Add => a.wrapping_add(b),
                Opcode::Sub => a.wrapping_sub(b),
                Opcode::Mul => a.wrapping_mul(b),
                Opcode::Div => a.wrapping_div(b),
                _ => a.wrapping_rem(b),
            }))
        }
        (lhs, rhs) => Err(mismatch(pc, "matching numeric operands", lhs, rhs)),
    }
}

fn compare(op: Opcode, lhs: Value, rhs: Value, pc: usize) -> Result<bool> {
    if op == Opcode::Ceq {
        if lhs.value_type() != rhs.value_type() {
            return Err(mismatch(pc, "operands of the same type", lhs, rhs));
        }
        return Ok(lhs == rhs);
    }
    let ordering = match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => a.cmp(&b),
        (Value::I64(a), Value::I64(b)) => a.cmp(&b),
        (lhs, rhs) => return Err(mismatch(pc, "matching numeric operands", lhs, rhs)),
    };
    Ok(match op {
        Opcode::Clt => ordering.is_lt(),
        _ => ordering.is_gt(),
    })
}

fn bitwise(op: Opcode, lhs: Value, rhs: Value, pc: usize) -> Result<Value> {
    let and = op == Opcode::And;
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => Ok(Value::I32(if and { a & b } else { a | b })),
        (Value::I64(a), Value::I64(b)) => Ok(Value::I64(if and { a & b } else { a | b })),
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if and { a && b } else { a || b })),
        (lhs, rhs) => Err(mismatch(pc, "operands of the same type", lhs, rhs)),
    }
}

fn mismatch(pc: usize, expected: &str, lhs: Value, rhs: Value) -> Error {
    let found = if lhs.value_type() == rhs.value_type() {
        lhs.value_type()
    } else {
        rhs.value_type()
    };
    Error::TypeMismatch {
        position: pc,
        expected: format!("{expected} (lhs {})", lhs.value_type()),
        found,
    }
}

fn join(types: &[ValueType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
