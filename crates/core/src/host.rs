//! Host-side contract for loading and replacing method bodies, plus an in-memory host.
//!
//! `MethodTable` stands in for a runtime that owns executable methods. It stores each body behind
//! an `Arc`, so a commit swaps the whole body in one step while concurrent invocations keep
//! running on the body they started with.

use crate::interp;
use crate::result::{Error, Result};
use crate::stream::{InstructionStream, MethodId, Signature};
use crate::validator;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Loads working copies of method bodies and installs replacements.
pub trait MethodHost: Send + Sync {
    /// Returns a working copy of the live body of `id`.
    ///
    /// # Errors
    /// `TargetNotFound` for unknown ids, `UnsupportedBody` for intrinsic methods.
    fn load(&self, id: &MethodId) -> Result<InstructionStream>;

    /// Verifies `stream` and atomically replaces the live body of `stream.method()`.
    ///
    /// # Errors
    /// `VerificationFailed` if the stream is not well-formed, `StaleBody` if it was loaded from a
    /// body that has since been replaced. The live body is left unchanged in both cases.
    fn commit(&self, stream: InstructionStream) -> Result<()>;
}

/// Notification fired when a method body becomes available for rewriting.
pub trait LoadHook: Send + Sync {
    fn on_method_loaded(&self, host: &dyn MethodHost, id: &MethodId);
}

/// Native implementation of an intrinsic method.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Option<Value>> + Send + Sync>;

#[derive(Clone)]
enum MethodEntry {
    Managed(Arc<InstructionStream>),
    Intrinsic {
        signature: Signature,
        native: NativeFn,
    },
}

/// In-memory method table.
#[derive(Default)]
pub struct MethodTable {
    methods: RwLock<HashMap<MethodId, MethodEntry>>,
    hooks: RwLock<Vec<Arc<dyn LoadHook>>>,
    revisions: AtomicU64,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a load-time hook. Hooks fire for methods defined after subscription.
    pub fn subscribe(&self, hook: Arc<dyn LoadHook>) {
        self.hooks.write().push(hook);
    }

    /// Stores `stream` as the live body of its method, then fires the load-time hooks.
    ///
    /// Redefining an existing method replaces its body and fires the hooks again.
    pub fn define(&self, mut stream: InstructionStream) -> Result<()> {
        validator::verify(&stream)?;
        stream.set_revision(self.next_revision());
        let id = stream.method().clone();
        let replaced = self
            .methods
            .write()
            .insert(id.clone(), MethodEntry::Managed(Arc::new(stream)))
            .is_some();
        tracing::debug!("Defined {} (replaced existing: {})", id, replaced);
        self.notify(&id);
        Ok(())
    }

    /// Registers a native method without an inspectable body.
    pub fn define_intrinsic(&self, id: MethodId, signature: Signature, native: NativeFn) {
        self.methods
            .write()
            .insert(id.clone(), MethodEntry::Intrinsic { signature, native });
        self.notify(&id);
    }

    pub fn contains(&self, id: &MethodId) -> bool {
        self.methods.read().contains_key(id)
    }

    /// Ids of every defined method, sorted.
    pub fn method_ids(&self) -> Vec<MethodId> {
        let mut ids: Vec<_> = self.methods.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Shared handle to the live body of a managed method.
    pub fn body(&self, id: &MethodId) -> Result<Arc<InstructionStream>> {
        match self.methods.read().get(id) {
            Some(MethodEntry::Managed(body)) => Ok(Arc::clone(body)),
            Some(MethodEntry::Intrinsic { .. }) => Err(Error::UnsupportedBody(id.clone())),
            None => Err(Error::TargetNotFound(id.clone())),
        }
    }

    /// SHA3-256 digest of the live body.
    pub fn body_digest(&self, id: &MethodId) -> Result<[u8; 32]> {
        self.body(id)?.digest()
    }

    pub fn signature(&self, id: &MethodId) -> Result<Signature> {
        match self.methods.read().get(id) {
            Some(MethodEntry::Managed(body)) => Ok(body.signature().clone()),
            Some(MethodEntry::Intrinsic { signature, .. }) => Ok(signature.clone()),
            None => Err(Error::TargetNotFound(id.clone())),
        }
    }

    /// Invokes the live body of `id`. The table lock is released before execution starts.
    pub fn invoke(&self, id: &MethodId, args: &[Value]) -> Result<Option<Value>> {
        let entry = self
            .methods
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TargetNotFound(id.clone()))?;
        match entry {
            MethodEntry::Managed(body) => interp::execute(&body, args),
            MethodEntry::Intrinsic { native, .. } => native(args),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn notify(&self, id: &MethodId) {
        let hooks: Vec<_> = self.hooks.read().iter().cloned().collect();
        for hook in hooks {
            hook.on_method_loaded(self, id);
        }
    }
}

impl MethodHost for MethodTable {
    fn load(&self, id: &MethodId) -> Result<InstructionStream> {
        let body = self.body(id)?;
        tracing::debug!("Loaded working copy of {} ({} instructions)", id, body.len());
        Ok(body.as_ref().clone())
    }

    fn commit(&self, mut stream: InstructionStream) -> Result<()> {
        let id = stream.method().clone();
        // Resolve the target first so unknown or intrinsic methods are reported as such.
        self.body(&id)?;
        validator::verify(&stream)?;

        let mut methods = self.methods.write();
        let Some(entry) = methods.get_mut(&id) else {
            return Err(Error::TargetNotFound(id));
        };
        let live = match entry {
            MethodEntry::Managed(body) => body.revision(),
            MethodEntry::Intrinsic { .. } => return Err(Error::UnsupportedBody(id)),
        };
        // Streams built from scratch carry no revision and may replace any body.
        if stream.revision().is_some_and(|loaded| Some(loaded) != live) {
            tracing::warn!("Rejected commit to {}: body was redefined after load", id);
            return Err(Error::StaleBody(id));
        }
        stream.set_revision(self.next_revision());
        *entry = MethodEntry::Managed(Arc::new(stream));
        drop(methods);

        tracing::info!("Committed new body for {}", id);
        Ok(())
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.method_ids())
            .field("hooks", &self.hooks.read().len())
            .finish()
    }
}
