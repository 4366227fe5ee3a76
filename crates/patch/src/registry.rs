//! Load-time patch registration.
//!
//! Each target method has at most one registration. Applying it loads a working copy from the
//! host, runs the patch through a [`Cursor`] and commits the result. The live body is only touched
//! by a successful commit, so a failing patch leaves the method exactly as it was loaded.

use crate::cursor::Cursor;
use crate::{Patch, Result};
use ilweave_core::encoder::digest_hex;
use ilweave_core::{LoadHook, MethodHost, MethodId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    /// Registered, not applied yet.
    Pending,
    /// Committed; `digest` is the hex SHA3-256 of the committed body.
    Applied { digest: String },
    /// The last attempt failed. A later load event retries.
    Failed { reason: String },
}

/// Result of [`PatchRegistry::apply_on_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    AlreadyApplied,
    NotRegistered,
}

/// Diagnostic view of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationInfo {
    pub target: MethodId,
    pub name: String,
    #[serde(flatten)]
    pub state: RegistrationState,
}

struct Registration {
    name: String,
    patch: Arc<dyn Patch>,
    state: RegistrationState,
}

#[derive(Default)]
pub struct PatchRegistry {
    entries: RwLock<HashMap<MethodId, Arc<Mutex<Registration>>>>,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `patch` for `target`. Returns false, keeping the first registration, if
    /// `target` already has one.
    pub fn register<F>(&self, target: MethodId, name: impl Into<String>, patch: F) -> bool
    where
        F: Fn(&mut Cursor<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register_patch(target, name, Arc::new(patch))
    }

    /// [`register`](Self::register) for patches that are not closures.
    pub fn register_patch(
        &self,
        target: MethodId,
        name: impl Into<String>,
        patch: Arc<dyn Patch>,
    ) -> bool {
        let name = name.into();
        match self.entries.write().entry(target) {
            Entry::Occupied(existing) => {
                tracing::warn!(
                    "Patch '{}' ignored: {} already has patch '{}'",
                    name,
                    existing.key(),
                    existing.get().lock().name
                );
                false
            }
            Entry::Vacant(slot) => {
                tracing::info!("Registered patch '{}' for {}", name, slot.key());
                slot.insert(Arc::new(Mutex::new(Registration {
                    name,
                    patch,
                    state: RegistrationState::Pending,
                })));
                true
            }
        }
    }

    pub fn is_registered(&self, target: &MethodId) -> bool {
        self.entries.read().contains_key(target)
    }

    /// Applies the registration for `target`, at most once.
    ///
    /// # Errors
    /// Whatever loading, the patch itself or the commit reported. The failure is recorded as
    /// [`RegistrationState::Failed`] and the live body is unchanged.
    pub fn apply_on_load(&self, host: &dyn MethodHost, target: &MethodId) -> Result<ApplyOutcome> {
        let Some(entry) = self.entries.read().get(target).cloned() else {
            tracing::trace!("No patch registered for {}", target);
            return Ok(ApplyOutcome::NotRegistered);
        };

        // Held for the whole attempt: two load events for one target apply the patch once.
        let mut registration = entry.lock();
        if matches!(registration.state, RegistrationState::Applied { .. }) {
            tracing::debug!(
                "Patch '{}' already applied to {}",
                registration.name,
                target
            );
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        match run_patch(host, target, registration.patch.as_ref()) {
            Ok(digest) => {
                tracing::info!(
                    "Applied patch '{}' to {} (body {})",
                    registration.name,
                    target,
                    digest
                );
                registration.state = RegistrationState::Applied { digest };
                Ok(ApplyOutcome::Applied)
            }
            Err(err) => {
                tracing::error!(
                    "Patch '{}' failed on {}: {}",
                    registration.name,
                    target,
                    err
                );
                registration.state = RegistrationState::Failed {
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    pub fn state(&self, target: &MethodId) -> Option<RegistrationState> {
        let entry = self.entries.read().get(target).cloned()?;
        let state = entry.lock().state.clone();
        Some(state)
    }

    /// Every registration, ordered by target.
    pub fn registrations(&self) -> Vec<RegistrationInfo> {
        let mut infos: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(target, entry)| {
                let registration = entry.lock();
                RegistrationInfo {
                    target: target.clone(),
                    name: registration.name.clone(),
                    state: registration.state.clone(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.target.cmp(&b.target));
        infos
    }
}

fn run_patch(host: &dyn MethodHost, target: &MethodId, patch: &dyn Patch) -> Result<String> {
    let mut stream = host.load(target)?;
    {
        let mut cursor = Cursor::new(&mut stream);
        patch.apply(&mut cursor)?;
    }
    let committed = stream.clone();
    host.commit(stream)?;
    Ok(digest_hex(&committed)?)
}

impl LoadHook for PatchRegistry {
    fn on_method_loaded(&self, host: &dyn MethodHost, id: &MethodId) {
        // Failures are recorded on the registration and logged by apply_on_load.
        let _ = self.apply_on_load(host, id);
    }
}

impl fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registrations()).finish()
    }
}
