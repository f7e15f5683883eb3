//! Error types for the document registry.

use thiserror::Error;

use crate::host::{DocumentHandle, HostCode};

/// Error returned by listeners attached to registry and document signals.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Host operations that can be rejected with a host error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOperation {
    Activate,
    Close,
}

impl std::fmt::Display for HostOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HostOperation::Activate => "activate",
            HostOperation::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A second wrapper was offered for a handle that is already registered.
    #[error("conflict: document '{0}' is already registered")]
    Conflict(String),

    /// A caller tried to open a resource that is already open.
    #[error("document already open: {0}")]
    AlreadyOpen(String),

    #[error("document not found: {0}")]
    NotFound(String),

    /// The wrapper exists but was never committed to the host.
    #[error("document '{0}' is not committed")]
    Detached(String),

    #[error("document '{0}' is closed")]
    Closed(String),

    /// The wrapper was bound to a handle the host has since invalidated.
    #[error("handle {0} is no longer alive")]
    StaleHandle(DocumentHandle),

    #[error("host rejected {operation}: error code {code}")]
    HostOperationFailed {
        operation: HostOperation,
        code: HostCode,
    },

    #[error("failed to open '{path}': error code {code}")]
    OpenFailed { path: String, code: HostCode },

    #[error("unsupported document kind: {0}")]
    UnsupportedKind(String),
}

impl RegistryError {
    pub(crate) fn host(operation: HostOperation, code: HostCode) -> Self {
        RegistryError::HostOperationFailed { operation, code }
    }
}
