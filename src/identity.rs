//! Handle identity as decided by the host.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::host::{DocumentHandle, Host};

/// Compares handles through the host's identity and liveness queries.
///
/// A dead handle is never the same as anything, itself included. Dead handles
/// seen during comparisons are staged in a dangling list so the registry can
/// purge them before its next read.
pub struct IdentityComparer {
    host: Arc<dyn Host>,
    dangling: Mutex<Vec<DocumentHandle>>,
}

impl IdentityComparer {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            dangling: Mutex::new(Vec::new()),
        }
    }

    pub fn is_alive(&self, handle: DocumentHandle) -> bool {
        self.host.is_alive(handle)
    }

    pub fn are_same(&self, a: DocumentHandle, b: DocumentHandle) -> bool {
        let a_alive = self.check_alive(a);
        let b_alive = self.check_alive(b);
        if !(a_alive && b_alive) {
            return false;
        }
        match (self.host.identity(a), self.host.identity(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Stage a handle for purging on the next registry read.
    pub fn mark_dangling(&self, handle: DocumentHandle) {
        let mut dangling = self.dangling.lock();
        if !dangling.iter().any(|h| h.same_token(&handle)) {
            debug!(%handle, "marking handle dangling");
            dangling.push(handle);
        }
    }

    pub fn has_dangling(&self) -> bool {
        !self.dangling.lock().is_empty()
    }

    pub(crate) fn take_dangling(&self) -> Vec<DocumentHandle> {
        std::mem::take(&mut *self.dangling.lock())
    }

    fn check_alive(&self, handle: DocumentHandle) -> bool {
        let alive = self.host.is_alive(handle);
        if !alive {
            self.mark_dangling(handle);
        }
        alive
    }
}

impl std::fmt::Debug for IdentityComparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityComparer")
            .field("dangling", &self.dangling.lock().len())
            .finish()
    }
}
