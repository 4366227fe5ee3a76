//! ilweave's single entry-point for turning assembly text into instruction streams, and back.
//!
//! ```text
//! .method RunHandler::TransitionOnLevelCompleted(bool, i32) -> bool
//! .locals (i32)
//!     ldarg 0
//!     brfalse @skip
//!     ...
//! @skip:
//!     ldc.bool false
//!     ret
//! ```
//!
//! `#` and `//` start comments. A method without `->` returns nothing; `-> void` is accepted too.

use crate::instruction::{Instruction, Operand};
use crate::opcode::{Opcode, OperandKind};
use crate::result::Error;
use crate::stream::{InstructionStream, MethodId, Signature};
use crate::value::{Value, ValueType};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Parses a file containing one or more `.method` blocks.
pub fn parse_module(src: &str) -> Result<Vec<InstructionStream>, Error> {
    if src.lines().all(|line| strip_comment(line).is_empty()) {
        return Err(Error::ParseError {
            line: 0,
            msg: "empty assembly".into(),
            raw: src.to_string(),
        });
    }

    let mut methods = Vec::new();
    let mut current: Option<PendingMethod> = None;

    for (idx, raw) in src.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }

        let parse_err = |msg: &str| Error::ParseError {
            line: line_no,
            msg: msg.to_string(),
            raw: raw.to_string(),
        };

        if let Some(header) = line.strip_prefix(".method") {
            if let Some(done) = current.take() {
                methods.push(done.finish()?);
            }
            let (method, signature) = parse_header(header).map_err(|msg| parse_err(&msg))?;
            current = Some(PendingMethod::new(method, signature, line_no));
            continue;
        }

        let Some(method) = current.as_mut() else {
            return Err(parse_err("instruction outside of a .method block"));
        };

        if let Some(locals) = line.strip_prefix(".locals") {
            if !method.lines.is_empty() {
                return Err(parse_err(".locals must precede the first instruction"));
            }
            method.signature.locals = parse_type_list(locals).map_err(|msg| parse_err(&msg))?;
            continue;
        }

        if let Some(label) = line.strip_suffix(':') {
            let name = label
                .strip_prefix('@')
                .filter(|name| !name.is_empty())
                .ok_or_else(|| parse_err("labels are written @name:"))?;
            if method
                .labels
                .insert(name.to_string(), method.lines.len())
                .is_some()
            {
                return Err(parse_err("duplicate label"));
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        let mnemonic = parts.next().ok_or_else(|| parse_err("missing opcode"))?;
        let op: Opcode = mnemonic
            .parse()
            .map_err(|_| parse_err(&format!("unknown opcode '{mnemonic}'")))?;
        let operand = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return Err(parse_err("too many operands"));
        }
        method.lines.push(PendingLine {
            op,
            operand,
            line: line_no,
            raw: raw.to_string(),
        });
    }

    if let Some(done) = current.take() {
        methods.push(done.finish()?);
    }
    Ok(methods)
}

/// Parses a file that must contain exactly one method.
pub fn parse_method(src: &str) -> Result<InstructionStream, Error> {
    let mut methods = parse_module(src)?;
    if methods.len() != 1 {
        return Err(Error::ParseError {
            line: 0,
            msg: format!("expected exactly one method, found {}", methods.len()),
            raw: String::new(),
        });
    }
    Ok(methods.remove(0))
}

/// Prints `stream` in the assembly format. Branch targets get generated `@L<pos>` labels and
/// `call` prints the bound provider name, so patched listings are for reading only.
pub fn disassemble(stream: &InstructionStream) -> String {
    let positions = stream.positions();
    let mut labels: BTreeMap<usize, String> = BTreeMap::new();
    for instruction in stream.instructions() {
        if let Some(target) = instruction.label()
            && let Some(&pos) = positions.get(&target)
        {
            labels.insert(pos, format!("L{pos}"));
        }
    }

    let signature = stream.signature();
    let mut out = String::new();
    let _ = write!(
        out,
        ".method {}({})",
        stream.method(),
        join_types(&signature.params)
    );
    if let Some(ret) = signature.returns {
        let _ = write!(out, " -> {ret}");
    }
    out.push('\n');
    if !signature.locals.is_empty() {
        let _ = writeln!(out, ".locals ({})", join_types(&signature.locals));
    }

    for (pos, entry) in stream.entries().iter().enumerate() {
        if let Some(name) = labels.get(&pos) {
            let _ = writeln!(out, "@{name}:");
        }
        let instruction = entry.instruction();
        let _ = write!(out, "    {}", instruction.op());
        for operand in instruction.operands() {
            match operand {
                Operand::Immediate(value) => {
                    let _ = write!(out, " {value}");
                }
                Operand::Index(index) => {
                    let _ = write!(out, " {index}");
                }
                Operand::Label(target) => match positions.get(target) {
                    Some(pos) => {
                        let _ = write!(out, " @L{pos}");
                    }
                    None => {
                        let _ = write!(out, " @<dangling {target}>");
                    }
                },
                Operand::External(ext) => match stream.external(*ext) {
                    Some(binding) => {
                        let _ = write!(out, " {}", binding.name());
                    }
                    None => {
                        let _ = write!(out, " <unbound ext{}>", ext.index());
                    }
                },
            }
        }
        out.push('\n');
    }
    out
}

struct PendingLine {
    op: Opcode,
    operand: Option<String>,
    line: usize,
    raw: String,
}

struct PendingMethod {
    method: MethodId,
    signature: Signature,
    header_line: usize,
    lines: Vec<PendingLine>,
    labels: HashMap<String, usize>,
}

impl PendingMethod {
    fn new(method: MethodId, signature: Signature, header_line: usize) -> Self {
        Self {
            method,
            signature,
            header_line,
            lines: Vec::new(),
            labels: HashMap::new(),
        }
    }

    fn finish(self) -> Result<InstructionStream, Error> {
        if let Some((name, _)) = self
            .labels
            .iter()
            .find(|(_, pos)| **pos >= self.lines.len())
        {
            return Err(Error::ParseError {
                line: self.header_line,
                msg: format!("label @{name} does not precede an instruction"),
                raw: String::new(),
            });
        }

        let mut stream = InstructionStream::new(self.method, self.signature);
        let mut branches = Vec::new();
        let mut ids = Vec::with_capacity(self.lines.len());

        for (pos, line) in self.lines.iter().enumerate() {
            let parse_err = |msg: String| Error::ParseError {
                line: line.line,
                msg,
                raw: line.raw.clone(),
            };
            let operands = match (line.op.operand_kind(), line.operand.as_deref()) {
                (OperandKind::None, None) => Vec::new(),
                (OperandKind::None, Some(_)) => {
                    return Err(parse_err(format!("{} takes no operand", line.op)));
                }
                (_, None) => return Err(parse_err(format!("{} requires an operand", line.op))),
                (OperandKind::Immediate(ty), Some(token)) => {
                    let value = Value::parse_as(ty, token)
                        .ok_or_else(|| parse_err(format!("'{token}' is not a valid {ty}")))?;
                    vec![Operand::Immediate(value)]
                }
                (OperandKind::Index, Some(token)) => {
                    let index = token
                        .parse::<u16>()
                        .map_err(|_| parse_err(format!("'{token}' is not a valid slot")))?;
                    vec![Operand::Index(index)]
                }
                (OperandKind::Label, Some(token)) => {
                    let name = token
                        .strip_prefix('@')
                        .ok_or_else(|| parse_err("branch targets are written @name".into()))?;
                    let target = *self
                        .labels
                        .get(name)
                        .ok_or_else(|| parse_err(format!("undefined label @{name}")))?;
                    branches.push((pos, target));
                    // Placeholder until every id is known.
                    Vec::new()
                }
                (OperandKind::External, Some(token)) => {
                    return Err(Error::UnboundExternal(token.to_string()));
                }
            };
            ids.push(stream.push(Instruction::new(line.op, operands)));
        }

        for (pos, target) in branches {
            stream.set_operands_at(pos, vec![Operand::Label(ids[target])]);
        }

        tracing::debug!(
            "Parsed {} with {} instructions",
            stream.method(),
            stream.len()
        );
        Ok(stream)
    }
}

fn strip_comment(raw: &str) -> &str {
    let line = raw.split('#').next().unwrap_or("");
    line.split("//").next().unwrap_or("").trim()
}

fn parse_header(header: &str) -> Result<(MethodId, Signature), String> {
    let header = header.trim();
    let open = header
        .find('(')
        .ok_or_else(|| "missing parameter list".to_string())?;
    let close = header
        .rfind(')')
        .filter(|&close| close > open)
        .ok_or_else(|| "unterminated parameter list".to_string())?;

    let method: MethodId = header[..open].trim().parse().map_err(|e: Error| e.to_string())?;
    let params = parse_type_list(&header[open..=close])?;

    let rest = header[close + 1..].trim();
    let returns = if rest.is_empty() {
        None
    } else {
        let ret = rest
            .strip_prefix("->")
            .ok_or_else(|| format!("unexpected '{rest}' after parameter list"))?
            .trim();
        if ret == "void" {
            None
        } else {
            Some(ret.parse::<ValueType>().map_err(|e| e.to_string())?)
        }
    };

    Ok((method, Signature::new(params, returns)))
}

fn parse_type_list(list: &str) -> Result<Vec<ValueType>, String> {
    let inner = list
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| "type lists are written (t1, t2)".to_string())?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<ValueType>().map_err(|e| e.to_string()))
        .collect()
}

fn join_types(types: &[ValueType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
