pub mod cursor;
pub mod inject;
pub mod pattern;
pub mod plan;
pub mod registry;
pub mod settings;

pub use cursor::{Cursor, CursorState};
pub use inject::{Injection, replace_current_with_call, replace_nth_with_call, replace_with_call};
pub use pattern::{MatchRule, Matcher};
pub use plan::PatchPlan;
pub use registry::{ApplyOutcome, PatchRegistry, RegistrationState};
pub use settings::{DisplayMeta, SettingHandle, SettingsStore};

use ilweave_core::ValueType;
use thiserror::Error;

/// Patch error type encompassing all patch module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Core operation failed (lookup, verification, encoding).
    #[error(transparent)]
    Core(#[from] ilweave_core::result::Error),

    /// The cursor is not positioned on an instruction.
    #[error("cursor is not positioned on an instruction")]
    NoCurrentInstruction,

    /// The inserted call does not replace the stack effect of the removed instruction.
    #[error("stack effect mismatch: removed instruction {expected}, provider pushes {found}")]
    StackEffectMismatch {
        /// Stack effect of the removed instruction.
        expected: String,
        /// Type pushed by the provider.
        found: ValueType,
    },

    /// A setting was read or written with a value of the wrong type.
    #[error("setting '{key}' holds {expected}, got {found}")]
    SettingTypeMismatch {
        /// Setting key.
        key: String,
        /// Declared type of the setting.
        expected: ValueType,
        /// Type of the rejected value.
        found: ValueType,
    },

    /// A patch plan is inconsistent.
    #[error("invalid patch plan: {0}")]
    Plan(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Patch result type
pub type Result<T> = std::result::Result<T, Error>;

/// A rewrite applied to a working copy of one method body.
///
/// Closures of the form `Fn(&mut Cursor<'_>) -> Result<()>` are patches too, so most callers
/// register a closure and only reusable rewrites need a dedicated type.
pub trait Patch: Send + Sync {
    fn apply(&self, cursor: &mut Cursor<'_>) -> Result<()>;
}

impl<F> Patch for F
where
    F: Fn(&mut Cursor<'_>) -> Result<()> + Send + Sync,
{
    fn apply(&self, cursor: &mut Cursor<'_>) -> Result<()> {
        self(cursor)
    }
}
