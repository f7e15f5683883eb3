use std::sync::Arc;

use crate::document::Document;
use crate::host::{DocumentHandle, SubscriptionId};
use crate::signal::ListenerId;

/// A registered document and the hooks that keep it in sync with the host.
pub(crate) struct Entry {
    pub(crate) handle: DocumentHandle,
    pub(crate) document: Arc<Document>,
    pub(crate) destroyed_listener: ListenerId,
    pub(crate) destroy_subscription: SubscriptionId,
}

/// Mutable registry state. Only ever borrowed for short spans that make no
/// host calls and emit nothing.
#[derive(Default)]
pub(crate) struct Table {
    pub(crate) attached: bool,
    pub(crate) entries: Vec<Entry>,
    /// Activations seen before the document was admitted, oldest first.
    pub(crate) pending_activations: Vec<DocumentHandle>,
    pub(crate) subscriptions: Vec<SubscriptionId>,
}

impl Table {
    pub(crate) fn snapshot(&self) -> Vec<(DocumentHandle, Arc<Document>)> {
        self.entries
            .iter()
            .map(|e| (e.handle, Arc::clone(&e.document)))
            .collect()
    }

    pub(crate) fn remove(&mut self, document: &Arc<Document>) -> Option<Entry> {
        let index = self
            .entries
            .iter()
            .position(|e| Arc::ptr_eq(&e.document, document))?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn contains(&self, document: &Arc<Document>) -> bool {
        self.entries
            .iter()
            .any(|e| Arc::ptr_eq(&e.document, document))
    }
}
