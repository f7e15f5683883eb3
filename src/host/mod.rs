//! The capability surface the registry needs from the host application.
//!
//! The host owns every document handle. The registry never interprets a handle
//! itself; liveness and identity are always answered by the host.

mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use crate::document::DocumentKind;

pub use memory::MemoryHost;

/// Opaque, host-issued token for an open document.
///
/// A token is a slot plus a generation. Hosts that recycle a slot hand out a
/// new generation, so stale tokens are reported dead rather than aliasing the
/// new document. Tokens intentionally do not implement `PartialEq`: use
/// [`IdentityComparer`](crate::IdentityComparer) to decide whether two tokens
/// denote the same document.
#[derive(Debug, Clone, Copy, Hash)]
pub struct DocumentHandle {
    slot: u64,
    generation: u32,
}

impl DocumentHandle {
    pub fn new(slot: u64, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Token equality. Says nothing about whether the document is still alive.
    pub(crate) fn same_token(&self, other: &DocumentHandle) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl std::fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

/// Identity the host reports for a live document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueId(pub u64);

/// Error code reported by the host when it rejects an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCode(pub i32);

impl HostCode {
    pub const FILE_NOT_FOUND: HostCode = HostCode(2);
    pub const INVALID_HANDLE: HostCode = HostCode(6);
    pub const NOT_SUPPORTED: HostCode = HostCode(50);
}

impl std::fmt::Display for HostCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flags passed to the host when opening a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read_only: bool,
    pub view_only: bool,
    pub silent: bool,
}

/// Identifies a host subscription so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Called with `(title, path)` when the host has loaded a document.
pub type LoadCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Called with the newly active document.
pub type ActivateCallback = Arc<dyn Fn(DocumentHandle) + Send + Sync>;

/// Called when the host destroys the subscribed document.
pub type DestroyCallback = Arc<dyn Fn(DocumentHandle) + Send + Sync>;

/// What a reference inside a document points at.
#[derive(Debug, Clone)]
pub enum ReferenceTarget {
    /// A file path as stored in the referencing document.
    Path(String),
    /// A component that only exists inside its owning document.
    Virtual { component: String, kind: DocumentKind },
}

/// A reference reported by the host for a document.
#[derive(Debug, Clone)]
pub struct HostReference {
    pub target: ReferenceTarget,
    /// The live document, when the host already has the reference open.
    pub open: Option<DocumentHandle>,
}

impl HostReference {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            target: ReferenceTarget::Path(path.into()),
            open: None,
        }
    }

    pub fn virtual_component(component: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            target: ReferenceTarget::Virtual {
                component: component.into(),
                kind,
            },
            open: None,
        }
    }

    pub fn with_open(mut self, handle: DocumentHandle) -> Self {
        self.open = Some(handle);
        self
    }
}

/// Operations the registry calls on the host application.
///
/// Every call is synchronous and made on the caller's thread. Callbacks may be
/// invoked re-entrantly from inside `open`, `create`, `activate` and `close`.
pub trait Host: Send + Sync {
    fn enumerate_open_documents(&self) -> Vec<DocumentHandle>;

    /// Number of documents the host currently has open.
    fn document_count(&self) -> usize;

    /// Host identity for a live handle; `None` once the handle is dead.
    fn identity(&self, handle: DocumentHandle) -> Option<OpaqueId>;

    fn is_alive(&self, handle: DocumentHandle) -> bool;

    fn title(&self, handle: DocumentHandle) -> Option<String>;

    fn path(&self, handle: DocumentHandle) -> Option<String>;

    /// Kind the host assigns to the document, if it has typed it yet.
    fn kind(&self, handle: DocumentHandle) -> Option<DocumentKind>;

    /// Resolve an open document by title or path.
    fn find_open_document(&self, name: &str) -> Option<DocumentHandle>;

    fn open(&self, path: &str, options: OpenOptions) -> Result<DocumentHandle, HostCode>;

    /// Create a new untitled document.
    fn create(&self, kind: DocumentKind) -> Result<DocumentHandle, HostCode>;

    fn activate(&self, handle: DocumentHandle) -> Result<(), HostCode>;

    fn active_document(&self) -> Option<DocumentHandle>;

    fn close(&self, handle: DocumentHandle) -> Result<(), HostCode>;

    fn subscribe_load(&self, callback: LoadCallback) -> SubscriptionId;

    fn subscribe_activate(&self, callback: ActivateCallback) -> SubscriptionId;

    fn subscribe_destroy(&self, handle: DocumentHandle, callback: DestroyCallback)
        -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);

    /// Direct references of the document at `path` (a file path or virtual id).
    fn enumerate_references(&self, path: &str) -> Result<Vec<HostReference>, HostCode>;

    /// Folders the host searches for referenced documents, in order.
    fn reference_search_folders(&self) -> Vec<PathBuf>;
}
