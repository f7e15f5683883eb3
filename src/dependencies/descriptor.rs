use std::sync::Arc;

use crate::document::{Document, DocumentKind};
use crate::paths;

/// One reference found while walking a document's dependencies.
#[derive(Debug, Clone)]
pub struct DependencyDescriptor {
    /// Resolved path, the stored path when unresolved, or a virtual id.
    pub path: String,
    pub kind: DocumentKind,
    /// An in-memory component owned by another document.
    pub is_virtual: bool,
    /// Whether the reference was found on disk (always true for virtual ones).
    pub resolved: bool,
    /// Path of the referencing document.
    pub parent: String,
    /// The registered wrapper when the document is already open.
    pub document: Option<Arc<Document>>,
}

impl DependencyDescriptor {
    pub fn file_name(&self) -> &str {
        paths::file_name(&self.path)
    }

    /// Open elsewhere and registered.
    pub fn is_already_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn is_committed(&self) -> bool {
        self.document.as_ref().is_some_and(|d| d.is_committed())
    }
}
