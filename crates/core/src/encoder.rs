//! Module for encoding instruction streams into their canonical byte form.
//!
//! The byte form is what "identical bodies" means: two streams encode to the same bytes iff they
//! have the same signature, the same external binding names/types and the same instructions with
//! branch targets expressed as positions. Instruction ids are not encoded.

use crate::instruction::Operand;
use crate::result::Error;
use crate::stream::InstructionStream;
use crate::value::{Value, ValueType};
use sha3::{Digest, Sha3_256};

const MAGIC: &[u8; 4] = b"ILW1";
const VOID_TAG: u8 = 0xFF;

/// Encodes `stream` into bytes.
///
/// # Errors
/// `UnresolvedLabel` when a branch targets an instruction that is not in the stream,
/// `InvalidOperands` when an operand count does not fit in the format, and `EncodingOverflow`
/// when a name, type list, table or position is too large for its length field.
pub fn encode(stream: &InstructionStream) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(32 + stream.len() * 4);
    bytes.extend_from_slice(MAGIC);

    let method = stream.method();
    write_str(&mut bytes, method.declaring_type())?;
    write_str(&mut bytes, method.name())?;

    let signature = stream.signature();
    write_types(&mut bytes, &signature.params)?;
    write_types(&mut bytes, &signature.locals)?;
    bytes.push(signature.returns.map(ValueType::tag).unwrap_or(VOID_TAG));

    let externals: u16 = fits("external table", stream.externals().len())?;
    bytes.extend_from_slice(&externals.to_le_bytes());
    for binding in stream.externals() {
        write_str(&mut bytes, binding.name())?;
        bytes.push(binding.value_type().tag());
    }

    let positions = stream.positions();
    let len: u32 = fits("instruction count", stream.len())?;
    bytes.extend_from_slice(&len.to_le_bytes());
    for (pos, instruction) in stream.instructions().enumerate() {
        bytes.push(instruction.op().to_byte());
        let count = u8::try_from(instruction.operands().len()).map_err(|_| {
            Error::InvalidOperands {
                opcode: instruction.op().to_string(),
                position: pos,
            }
        })?;
        bytes.push(count);

        for operand in instruction.operands() {
            match operand {
                Operand::Immediate(value) => {
                    bytes.push(value.value_type().tag());
                    match value {
                        Value::I32(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                        Value::I64(v) => bytes.extend_from_slice(&v.to_le_bytes()),
                        Value::Bool(v) => bytes.push(u8::from(*v)),
                    }
                }
                Operand::Label(target) => {
                    let Some(&target_pos) = positions.get(target) else {
                        tracing::error!(
                            "Branch at position {} in {} targets missing instruction {}",
                            pos,
                            stream.method(),
                            target
                        );
                        return Err(Error::UnresolvedLabel {
                            label: target.to_string(),
                            position: pos,
                        });
                    };
                    let target_pos: u32 = fits("branch target", target_pos)?;
                    bytes.push(0x10);
                    bytes.extend_from_slice(&target_pos.to_le_bytes());
                }
                Operand::Index(index) => {
                    bytes.push(0x11);
                    bytes.extend_from_slice(&index.to_le_bytes());
                }
                Operand::External(ext) => {
                    let ext: u16 = fits("external reference", ext.index())?;
                    bytes.push(0x12);
                    bytes.extend_from_slice(&ext.to_le_bytes());
                }
            }
        }
    }

    tracing::debug!(
        "Encoded {} instructions of {} into {} bytes",
        stream.len(),
        stream.method(),
        bytes.len()
    );
    Ok(bytes)
}

/// SHA3-256 over [`encode`].
pub fn digest(stream: &InstructionStream) -> Result<[u8; 32], Error> {
    let bytes = encode(stream)?;
    let mut hasher = Sha3_256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}

/// Hex form of [`digest`] with a 0x prefix.
pub fn digest_hex(stream: &InstructionStream) -> Result<String, Error> {
    Ok(format!("0x{}", hex::encode(digest(stream)?)))
}

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<(), Error> {
    let len: u16 = fits("string", s.len())?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_types(out: &mut Vec<u8>, types: &[ValueType]) -> Result<(), Error> {
    let len: u8 = fits("type list", types.len())?;
    out.push(len);
    out.extend(types.iter().map(|ty| ty.tag()));
    Ok(())
}

/// Narrows a length for its field. Silent truncation would let distinct bodies share bytes.
fn fits<T: TryFrom<usize>>(field: &'static str, value: usize) -> Result<T, Error> {
    T::try_from(value).map_err(|_| Error::EncodingOverflow { field, value })
}
