pub mod decoder;
pub mod encoder;
pub mod host;
pub mod instruction;
pub mod interp;
pub mod opcode;
pub mod result;
pub mod stream;
pub mod validator;
pub mod value;

pub use host::{LoadHook, MethodHost, MethodTable, NativeFn};
pub use instruction::{ExternRef, InstrId, Instruction, Operand};
pub use opcode::Opcode;
pub use stream::{InstructionStream, MethodId, Signature, StackEffect, ValueSource};
pub use value::{Value, ValueType};

/// Returns true if the opcode never falls through to the next instruction.
#[inline]
pub fn is_terminal_opcode(opcode: Opcode) -> bool {
    opcode.is_terminal()
}

/// Returns true if the opcode ends a basic block.
///
/// Block-ending opcodes are the terminal ones plus the conditional branches, which may transfer
/// control away from the fall-through successor.
#[inline]
pub fn is_block_ending_opcode(opcode: Opcode) -> bool {
    opcode.is_block_ending()
}

/// Parses every method in `src` and defines it on `table`.
///
/// Definitions fire the table's load-time hooks, so patches registered before this call are
/// applied as each method is defined.
///
/// # Example
/// ```rust
/// use ilweave_core::{load_module, MethodId, MethodTable, Value};
///
/// let table = MethodTable::new();
/// let ids = load_module(&table, ".method A::one() -> i32\n    ldc.i4 1\n    ret\n").unwrap();
/// assert_eq!(ids, vec![MethodId::new("A", "one")]);
/// assert_eq!(table.invoke(&ids[0], &[]).unwrap(), Some(Value::I32(1)));
/// ```
pub fn load_module(table: &MethodTable, src: &str) -> result::Result<Vec<MethodId>> {
    let streams = decoder::parse_module(src)?;
    let mut ids = Vec::with_capacity(streams.len());
    for stream in streams {
        ids.push(stream.method().clone());
        table.define(stream)?;
    }
    tracing::debug!("Loaded {} method(s) into the table", ids.len());
    Ok(ids)
}
