//! Turns host notifications into document wrappers.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::document::{Document, DocumentKind, KindResolver};
use crate::error::ListenerError;
use crate::host::{DocumentHandle, Host};
use crate::identity::IdentityComparer;
use crate::paths;
use crate::signal::{ListenerId, Signal};

/// Builds a wrapper for every load notification and announces it on the
/// `dispatched` signal.
///
/// The dispatcher does not know what is registered. A duplicate notification
/// produces a second, transient wrapper; admission decides which one wins.
pub struct Dispatcher {
    host: Arc<dyn Host>,
    comparer: Arc<IdentityComparer>,
    kinds: KindResolver,
    pending: Mutex<Vec<Arc<Document>>>,
    dispatched: Signal<Arc<Document>>,
}

impl Dispatcher {
    pub fn new(host: Arc<dyn Host>, comparer: Arc<IdentityComparer>, kinds: KindResolver) -> Self {
        Self {
            host,
            comparer,
            kinds,
            pending: Mutex::new(Vec::new()),
            dispatched: Signal::new("dispatched"),
        }
    }

    pub fn kinds(&self) -> &KindResolver {
        &self.kinds
    }

    pub fn on_dispatched<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<Document>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.dispatched.connect(listener)
    }

    pub fn disconnect(&self, id: ListenerId) -> bool {
        self.dispatched.disconnect(id)
    }

    /// Handle a load notification carrying the document's title and path.
    pub fn dispatch(&self, title: &str, path: &str) -> Option<Arc<Document>> {
        let name = if path.is_empty() { title } else { path };
        let Some(handle) = self.host.find_open_document(name) else {
            warn!(title, path, "no open document matches load notification");
            return None;
        };
        self.dispatch_resolved(handle, title.to_string(), path.to_string())
    }

    /// Handle a document found through host enumeration.
    pub fn dispatch_handle(&self, handle: DocumentHandle) -> Option<Arc<Document>> {
        let title = self.host.title(handle).unwrap_or_default();
        let path = self.host.path(handle).unwrap_or_default();
        self.dispatch_resolved(handle, title, path)
    }

    /// Kind from the extension, else whatever the host says, else `Unknown`.
    pub fn resolve_kind(&self, handle: DocumentHandle, path: &str) -> DocumentKind {
        self.kinds
            .resolve(path)
            .or_else(|| self.host.kind(handle))
            .unwrap_or(DocumentKind::Unknown)
    }

    fn dispatch_resolved(
        &self,
        handle: DocumentHandle,
        title: String,
        path: String,
    ) -> Option<Arc<Document>> {
        if !self.comparer.is_alive(handle) {
            warn!(%handle, title = %title, "notified document is already dead");
            self.comparer.mark_dangling(handle);
            return None;
        }

        let kind = self.resolve_kind(handle, &path);
        let document = match self.take_pending(&path, kind) {
            Some(document) => {
                document.bind(handle, title, path, kind);
                document
            }
            None => Document::bound(kind, handle, title, path),
        };

        debug!(%handle, document = %document.name(), %kind, "dispatching document");
        self.dispatched.emit(&document);
        Some(document)
    }

    /// Announce a wrapper the caller bound itself.
    pub(crate) fn announce(&self, document: &Arc<Document>) {
        self.dispatched.emit(document);
    }

    /// Route the next matching load notification to `document`.
    pub(crate) fn begin_dispatch(&self, document: Arc<Document>) {
        self.pending.lock().push(document);
    }

    pub(crate) fn end_dispatch(&self, document: &Arc<Document>) {
        self.pending.lock().retain(|d| !Arc::ptr_eq(d, document));
    }

    fn take_pending(&self, path: &str, kind: DocumentKind) -> Option<Arc<Document>> {
        let mut pending = self.pending.lock();
        let index = pending.iter().position(|doc| {
            let doc_path = doc.path();
            if path.is_empty() {
                doc_path.is_empty() && (!doc.kind().is_specific() || doc.kind() == kind)
            } else {
                paths::same_path(&doc_path, path)
            }
        })?;
        Some(pending.remove(index))
    }
}
