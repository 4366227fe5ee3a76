//! Method identity, signatures and the mutable instruction stream of one method body.

use crate::instruction::{ExternRef, InstrId, Instruction, Operand};
use crate::opcode::Opcode;
use crate::result::Error;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Stable method identifier: declaring type plus method name, written `Type::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodId {
    declaring_type: String,
    name: String,
}

impl MethodId {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
        }
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

impl FromStr for MethodId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, name) = s
            .trim()
            .rsplit_once("::")
            .ok_or_else(|| Error::InvalidMethodId(s.to_string()))?;
        if ty.is_empty() || name.is_empty() {
            return Err(Error::InvalidMethodId(s.to_string()));
        }
        Ok(MethodId::new(ty, name))
    }
}

impl TryFrom<String> for MethodId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MethodId> for String {
    fn from(id: MethodId) -> Self {
        id.to_string()
    }
}

/// Parameter, local and return types of a method. `returns == None` means void.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<ValueType>,
    #[serde(default)]
    pub locals: Vec<ValueType>,
    pub returns: Option<ValueType>,
}

impl Signature {
    pub fn new(params: Vec<ValueType>, returns: Option<ValueType>) -> Self {
        Self {
            params,
            locals: Vec::new(),
            returns,
        }
    }

    pub fn with_locals(mut self, locals: Vec<ValueType>) -> Self {
        self.locals = locals;
        self
    }
}

/// Zero-argument provider invoked when a patched `call` instruction executes.
///
/// Implementations may be called from many threads at once and must return one consistent value
/// per call.
pub trait ValueSource: Send + Sync {
    /// Display name used in listings and logs.
    fn name(&self) -> &str;
    /// Declared type of every value this source produces.
    fn value_type(&self) -> ValueType;
    fn current_value(&self) -> Value;
}

/// External provider bound into a stream.
#[derive(Clone)]
pub struct ExternBinding {
    name: String,
    value_type: ValueType,
    source: Arc<dyn ValueSource>,
}

impl ExternBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn source(&self) -> &Arc<dyn ValueSource> {
        &self.source
    }
}

impl fmt::Debug for ExternBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternBinding")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Instruction stored in a stream together with its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    id: InstrId,
    instruction: Instruction,
}

impl Entry {
    pub fn id(&self) -> InstrId {
        self.id
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }
}

/// Values consumed and produced by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
    /// Type of the pushed value when exactly one value of a statically known type is pushed.
    pub pushed_type: Option<ValueType>,
}

impl fmt::Display for StackEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pops {}, pushes {}", self.pops, self.pushes)?;
        if let Some(ty) = self.pushed_type {
            write!(f, " ({ty})")?;
        }
        Ok(())
    }
}

/// Ordered, mutable instruction sequence of exactly one method body.
#[derive(Debug, Clone)]
pub struct InstructionStream {
    method: MethodId,
    signature: Signature,
    entries: Vec<Entry>,
    externs: Vec<ExternBinding>,
    next_id: u32,
    /// Revision of the live body this stream was loaded from, if any. Not part of the encoding.
    revision: Option<u64>,
}

impl InstructionStream {
    pub fn new(method: MethodId, signature: Signature) -> Self {
        Self {
            method,
            signature,
            entries: Vec::new(),
            externs: Vec::new(),
            next_id: 0,
            revision: None,
        }
    }

    /// Host revision this stream was stored under or loaded from.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.revision = Some(revision);
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.entries.get(index).map(|entry| &entry.instruction)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.iter().map(|entry| &entry.instruction)
    }

    pub fn id_at(&self, index: usize) -> Option<InstrId> {
        self.entries.get(index).map(|entry| entry.id)
    }

    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    /// Maps every instruction id to its current position.
    pub fn positions(&self) -> HashMap<InstrId, usize> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.id, idx))
            .collect()
    }

    /// Appends an instruction and returns its new id.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = self.allocate_id();
        self.entries.push(Entry { id, instruction });
        id
    }

    /// Inserts before position `index` (or appends when `index == len`). Later positions shift by
    /// one; ids are unaffected.
    pub fn insert(&mut self, index: usize, instruction: Instruction) -> Result<InstrId, Error> {
        if index > self.entries.len() {
            return Err(Error::PositionOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        let id = self.allocate_id();
        self.entries.insert(index, Entry { id, instruction });
        Ok(id)
    }

    /// Removes the instruction at `index`. Labels pointing at it are left untouched.
    pub fn remove(&mut self, index: usize) -> Result<(InstrId, Instruction), Error> {
        if index >= self.entries.len() {
            return Err(Error::PositionOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        let entry = self.entries.remove(index);
        Ok((entry.id, entry.instruction))
    }

    /// Ids of branch instructions whose label targets `target`.
    pub fn referrers(&self, target: InstrId) -> Vec<InstrId> {
        self.entries
            .iter()
            .filter(|entry| entry.instruction.label() == Some(target))
            .map(|entry| entry.id)
            .collect()
    }

    /// Redirects every label targeting `from` to `to` and returns the ids of the rewritten
    /// instructions.
    pub fn retarget(&mut self, from: InstrId, to: InstrId) -> Vec<InstrId> {
        let mut changed = Vec::new();
        for entry in &mut self.entries {
            if entry.instruction.retarget(from, to) {
                changed.push(entry.id);
            }
        }
        changed
    }

    /// Like [`retarget`](Self::retarget) but restricted to the instructions in `branches`.
    pub fn retarget_only(&mut self, branches: &[InstrId], from: InstrId, to: InstrId) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            if branches.contains(&entry.id) && entry.instruction.retarget(from, to) {
                changed += 1;
            }
        }
        changed
    }

    /// Adds `source` to the external binding table.
    pub fn bind_external(&mut self, source: Arc<dyn ValueSource>) -> Result<ExternRef, Error> {
        let index = u16::try_from(self.externs.len()).map_err(|_| Error::TooManyExternals)?;
        self.externs.push(ExternBinding {
            name: source.name().to_string(),
            value_type: source.value_type(),
            source,
        });
        Ok(ExternRef(index))
    }

    pub fn externals(&self) -> &[ExternBinding] {
        &self.externs
    }

    pub fn external(&self, ext: ExternRef) -> Option<&ExternBinding> {
        self.externs.get(ext.index())
    }

    /// Statically known stack effect of `instruction` in the context of this method. Returns
    /// `None` when an operand does not resolve (bad slot or external).
    pub fn stack_effect(&self, instruction: &Instruction) -> Option<StackEffect> {
        let effect = |pops, pushes, pushed_type| StackEffect {
            pops,
            pushes,
            pushed_type,
        };
        Some(match instruction.op() {
            Opcode::Nop | Opcode::Br => effect(0, 0, None),
            Opcode::LdcI4 | Opcode::LdcI8 | Opcode::LdcBool => {
                effect(0, 1, Some(instruction.immediate()?.value_type()))
            }
            Opcode::Ldarg => {
                let ty = *self.signature.params.get(instruction.slot()? as usize)?;
                effect(0, 1, Some(ty))
            }
            Opcode::Ldloc => {
                let ty = *self.signature.locals.get(instruction.slot()? as usize)?;
                effect(0, 1, Some(ty))
            }
            Opcode::Starg | Opcode::Stloc | Opcode::Pop | Opcode::Brtrue | Opcode::Brfalse => {
                effect(1, 0, None)
            }
            Opcode::Call => {
                let binding = self.external(instruction.external()?)?;
                effect(0, 1, Some(binding.value_type))
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or => effect(2, 1, None),
            Opcode::Ceq | Opcode::Clt | Opcode::Cgt => effect(2, 1, Some(ValueType::Bool)),
            Opcode::Not => effect(1, 1, None),
            Opcode::Dup => effect(1, 2, None),
            Opcode::Ret => effect(usize::from(self.signature.returns.is_some()), 0, None),
        })
    }

    /// SHA3-256 digest of the binary encoding.
    pub fn digest(&self) -> Result<[u8; 32], Error> {
        crate::encoder::digest(self)
    }

    pub(crate) fn set_operands_at(&mut self, index: usize, operands: Vec<Operand>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.instruction.set_operands(operands);
        }
    }

    fn allocate_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl fmt::Display for InstructionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::decoder::disassemble(self))
    }
}
