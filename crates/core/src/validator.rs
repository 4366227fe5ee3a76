//! Structural verification run before a stream replaces a live method body.
//!
//! Two phases. First every instruction is checked in isolation: operand shape, slot and external
//! indices, label resolution. Only a stream that passes is simulated: the body is split into basic
//! blocks, the blocks form a `petgraph` graph, and a typed stack is propagated along the edges.
//! Anything that cannot be proven consistent this way is reported; the verifier never guesses.

use crate::instruction::{Instruction, Operand};
use crate::opcode::{Opcode, OperandKind};
use crate::result::{Error, Result};
use crate::stream::InstructionStream;
use crate::value::ValueType;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

/// One problem found by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Position of the offending instruction, if the problem is tied to one.
    pub position: Option<usize>,
    pub message: String,
}

impl Violation {
    fn at(position: usize, message: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            message: message.into(),
        }
    }

    fn method(message: impl Into<String>) -> Self {
        Self {
            position: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "at {pos}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Verifies `stream`, returning `VerificationFailed` with every violation found.
pub fn verify(stream: &InstructionStream) -> Result<()> {
    let violations = collect_violations(stream);
    if violations.is_empty() {
        tracing::debug!("Verified {} ({} instructions)", stream.method(), stream.len());
        return Ok(());
    }

    for violation in &violations {
        tracing::warn!("{}: {}", stream.method(), violation);
    }
    Err(Error::VerificationFailed {
        method: stream.method().clone(),
        violations,
    })
}

/// Runs both verification phases and returns the problems without failing.
pub fn collect_violations(stream: &InstructionStream) -> Vec<Violation> {
    if stream.is_empty() {
        return vec![Violation::method("method body is empty")];
    }
    let violations = check_operands(stream);
    if !violations.is_empty() {
        return violations;
    }
    check_stack(stream)
}

fn check_operands(stream: &InstructionStream) -> Vec<Violation> {
    let positions = stream.positions();
    let signature = stream.signature();
    let mut violations = Vec::new();

    for (pos, instruction) in stream.instructions().enumerate() {
        let op = instruction.op();
        let operands = instruction.operands();
        let shape_ok = match (op.operand_kind(), operands) {
            (OperandKind::None, []) => true,
            (OperandKind::Immediate(ty), [Operand::Immediate(value)]) => value.value_type() == ty,
            (OperandKind::Index, [Operand::Index(_)]) => true,
            (OperandKind::Label, [Operand::Label(_)]) => true,
            (OperandKind::External, [Operand::External(_)]) => true,
            _ => false,
        };
        if !shape_ok {
            violations.push(Violation::at(pos, format!("invalid operands for {op}")));
            continue;
        }

        match op {
            Opcode::Ldarg | Opcode::Starg => {
                let slot = instruction.slot().unwrap_or(u16::MAX) as usize;
                if slot >= signature.params.len() {
                    violations.push(Violation::at(
                        pos,
                        format!("argument {slot} out of range ({} params)", signature.params.len()),
                    ));
                }
            }
            Opcode::Ldloc | Opcode::Stloc => {
                let slot = instruction.slot().unwrap_or(u16::MAX) as usize;
                if slot >= signature.locals.len() {
                    violations.push(Violation::at(
                        pos,
                        format!("local {slot} out of range ({} locals)", signature.locals.len()),
                    ));
                }
            }
            Opcode::Call => {
                if let Some(ext) = instruction.external()
                    && stream.external(ext).is_none()
                {
                    violations.push(Violation::at(
                        pos,
                        format!("unresolved external ext{}", ext.index()),
                    ));
                }
            }
            _ if op.is_branch() => {
                if let Some(target) = instruction.label()
                    && !positions.contains_key(&target)
                {
                    violations.push(Violation::at(
                        pos,
                        format!("branch target {target} is not in the method"),
                    ));
                }
            }
            _ => {}
        }
    }
    violations
}

/// Basic block covering positions `start..end`.
#[derive(Debug, Clone, Copy)]
struct BasicBlock {
    start: usize,
    end: usize,
}

fn build_block_graph(
    stream: &InstructionStream,
    violations: &mut Vec<Violation>,
) -> (DiGraph<BasicBlock, ()>, HashMap<usize, NodeIndex>) {
    let positions = stream.positions();
    let len = stream.len();
    let target_of = |instruction: &Instruction| {
        instruction
            .label()
            .and_then(|target| positions.get(&target).copied())
    };

    let mut leaders = BTreeSet::from([0usize]);
    for (pos, instruction) in stream.instructions().enumerate() {
        if let Some(target) = target_of(instruction) {
            leaders.insert(target);
        }
        if instruction.op().is_block_ending() && pos + 1 < len {
            leaders.insert(pos + 1);
        }
    }

    let mut graph = DiGraph::new();
    let mut by_start = HashMap::new();
    let starts: Vec<usize> = leaders.into_iter().collect();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(len);
        by_start.insert(start, graph.add_node(BasicBlock { start, end }));
    }

    for &start in &starts {
        let node = by_start[&start];
        let block = graph[node];
        let last_pos = block.end - 1;
        let Some(last) = stream.get(last_pos) else {
            continue;
        };
        if let Some(target) = target_of(last) {
            graph.add_edge(node, by_start[&target], ());
        }
        if !last.op().is_terminal() {
            match by_start.get(&block.end) {
                Some(&next) => {
                    graph.add_edge(node, next, ());
                }
                None => violations.push(Violation::at(
                    last_pos,
                    format!("control falls off the end of the method after block at {start}"),
                )),
            }
        }
    }

    (graph, by_start)
}

fn check_stack(stream: &InstructionStream) -> Vec<Violation> {
    let mut violations = Vec::new();
    let (graph, by_start) = build_block_graph(stream, &mut violations);

    let entry = by_start[&0];
    let mut entry_states: HashMap<NodeIndex, Vec<ValueType>> = HashMap::from([(entry, Vec::new())]);
    let mut worklist = VecDeque::from([entry]);
    let mut reported_merges = BTreeSet::new();

    while let Some(node) = worklist.pop_front() {
        let block = graph[node];
        let mut stack = entry_states[&node].clone();

        let mut failed = false;
        for pos in block.start..block.end {
            let Some(instruction) = stream.get(pos) else {
                break;
            };
            if let Err(violation) = simulate(stream, pos, instruction, &mut stack) {
                violations.push(violation);
                failed = true;
                break;
            }
        }
        if failed {
            continue;
        }

        for succ in graph.neighbors(node) {
            match entry_states.get(&succ) {
                None => {
                    entry_states.insert(succ, stack.clone());
                    worklist.push_back(succ);
                }
                Some(existing) if *existing != stack => {
                    let start = graph[succ].start;
                    if reported_merges.insert(start) {
                        violations.push(Violation::at(
                            start,
                            format!(
                                "stack shape differs between incoming paths: [{}] vs [{}]",
                                describe(existing),
                                describe(&stack)
                            ),
                        ));
                    }
                }
                Some(_) => {}
            }
        }
    }

    violations
}

fn simulate(
    stream: &InstructionStream,
    pos: usize,
    instruction: &Instruction,
    stack: &mut Vec<ValueType>,
) -> std::result::Result<(), Violation> {
    let signature = stream.signature();
    let op = instruction.op();
    let pop = |stack: &mut Vec<ValueType>| {
        stack
            .pop()
            .ok_or_else(|| Violation::at(pos, format!("stack underflow in {op}")))
    };
    let expect = |found: ValueType, expected: ValueType| {
        if found == expected {
            Ok(())
        } else {
            Err(Violation::at(
                pos,
                format!("{op} expects {expected}, found {found}"),
            ))
        }
    };

    match op {
        Opcode::Nop | Opcode::Br => {}
        Opcode::LdcI4 | Opcode::LdcI8 | Opcode::LdcBool => {
            if let Some(value) = instruction.immediate() {
                stack.push(value.value_type());
            }
        }
        Opcode::Ldarg => stack.push(signature.params[slot(instruction)]),
        Opcode::Ldloc => stack.push(signature.locals[slot(instruction)]),
        Opcode::Starg => {
            let found = pop(stack)?;
            expect(found, signature.params[slot(instruction)])?;
        }
        Opcode::Stloc => {
            let found = pop(stack)?;
            expect(found, signature.locals[slot(instruction)])?;
        }
        Opcode::Call => {
            let binding = instruction
                .external()
                .and_then(|ext| stream.external(ext))
                .ok_or_else(|| Violation::at(pos, "unresolved external"))?;
            stack.push(binding.value_type());
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Rem => {
            let rhs = pop(stack)?;
            let lhs = pop(stack)?;
            if !lhs.is_numeric() || lhs != rhs {
                return Err(Violation::at(
                    pos,
                    format!("{op} needs two operands of the same numeric type, found {lhs} and {rhs}"),
                ));
            }
            stack.push(lhs);
        }
        Opcode::And | Opcode::Or => {
            let rhs = pop(stack)?;
            let lhs = pop(stack)?;
            if lhs != rhs {
                return Err(Violation::at(
                    pos,
                    format!("{op} needs operands of the same type, found {lhs} and {rhs}"),
                ));
            }
            stack.push(lhs);
        }
        Opcode::Ceq => {
            let rhs = pop(stack)?;
            let lhs = pop(stack)?;
            expect(rhs, lhs)?;
            stack.push(ValueType::Bool);
        }
        Opcode::Clt | Opcode::Cgt => {
            let rhs = pop(stack)?;
            let lhs = pop(stack)?;
            if !lhs.is_numeric() || lhs != rhs {
                return Err(Violation::at(
                    pos,
                    format!("{op} compares two values of the same numeric type, found {lhs} and {rhs}"),
                ));
            }
            stack.push(ValueType::Bool);
        }
        Opcode::Not => {
            let value = pop(stack)?;
            stack.push(value);
        }
        Opcode::Dup => {
            let value = pop(stack)?;
            stack.push(value);
            stack.push(value);
        }
        Opcode::Pop | Opcode::Brtrue | Opcode::Brfalse => {
            pop(stack)?;
        }
        Opcode::Ret => {
            if let Some(ret) = signature.returns {
                let found = pop(stack)?;
                expect(found, ret)?;
            }
            if !stack.is_empty() {
                return Err(Violation::at(
                    pos,
                    format!(
                        "{} value(s) left on the stack at return: [{}]",
                        stack.len(),
                        describe(stack)
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn slot(instruction: &Instruction) -> usize {
    // Range-checked by `check_operands` before simulation.
    instruction.slot().unwrap_or(0) as usize
}

fn describe(stack: &[ValueType]) -> String {
    stack
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
