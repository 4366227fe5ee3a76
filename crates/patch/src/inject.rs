//! Replace-with-provider primitive built on the cursor.

use crate::cursor::Cursor;
use crate::pattern::Matcher;
use crate::Result;
use ilweave_core::{ExternRef, Instruction, ValueSource, ValueType};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Record of one completed replacement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Injection {
    /// Position of the inserted call.
    pub position: usize,
    pub removed: Instruction,
    pub external: ExternRef,
    /// Provider name as bound in the stream.
    pub source: String,
    pub value_type: ValueType,
}

/// Replaces the next instruction accepted by `matcher` with a call to `source`.
///
/// The provider is invoked every time the patched method executes that point, so the method
/// observes the provider's value at execution time rather than at patch time.
///
/// # Errors
/// `NoCurrentInstruction` when nothing matches (a warning naming the method is logged first),
/// `StackEffectMismatch` when the matched instruction is not a single push of the provider's type.
pub fn replace_with_call<M: Matcher + ?Sized>(
    cursor: &mut Cursor<'_>,
    matcher: &M,
    source: Arc<dyn ValueSource>,
) -> Result<Injection> {
    replace_nth_with_call(cursor, matcher, NonZeroUsize::MIN, source)
}

/// Like [`replace_with_call`], but skips `occurrence - 1` matches first.
pub fn replace_nth_with_call<M: Matcher + ?Sized>(
    cursor: &mut Cursor<'_>,
    matcher: &M,
    occurrence: NonZeroUsize,
    source: Arc<dyn ValueSource>,
) -> Result<Injection> {
    for seen in 0..occurrence.get() {
        if !cursor.find_next(matcher) {
            tracing::warn!(
                "Pattern for '{}' not found in {} (wanted occurrence {}, saw {})",
                source.name(),
                cursor.stream().method(),
                occurrence,
                seen
            );
            break;
        }
    }
    replace_current_with_call(cursor, source)
}

/// Replaces the instruction under the cursor with a call to `source`.
///
/// # Errors
/// `NoCurrentInstruction` unless the cursor is on an instruction, `StackEffectMismatch` as for
/// [`replace_with_call`].
pub fn replace_current_with_call(
    cursor: &mut Cursor<'_>,
    source: Arc<dyn ValueSource>,
) -> Result<Injection> {
    let removed = cursor.remove_current()?;
    let name = source.name().to_string();
    let value_type = source.value_type();
    let external = cursor.insert_call(source)?;
    let position = cursor.index().unwrap_or_default();

    tracing::debug!(
        "Replaced `{}` with call to '{}' at {} in {}",
        removed,
        name,
        position,
        cursor.stream().method()
    );
    Ok(Injection {
        position,
        removed,
        external,
        source: name,
        value_type,
    })
}
