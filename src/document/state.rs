//! Document wrapper and its lifecycle.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::kind::DocumentKind;
use crate::error::{ListenerError, RegistryError, Result};
use crate::host::{DocumentHandle, OpenOptions};
use crate::paths;
use crate::signal::{ListenerId, Signal};

/// Lifecycle state of a document. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DocumentState {
    /// Constructed, not bound to a host document.
    Detached,
    /// Bound to a live handle and registered.
    Open,
    Closing,
    /// Released. Terminal.
    Closed,
}

/// Why a document is going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The registry was asked to close it.
    Close,
    /// The host destroyed it.
    Destroy,
    /// The host invalidated the handle without telling anyone.
    Stale,
}

/// Payload of the per-document `closing` signal.
#[derive(Debug, Clone)]
pub struct ClosingEvent {
    pub document: Arc<Document>,
    pub reason: CloseReason,
}

#[derive(Debug)]
struct DocumentInner {
    handle: Option<DocumentHandle>,
    kind: DocumentKind,
    title: String,
    path: String,
    state: DocumentState,
    options: OpenOptions,
    close_requested: bool,
}

/// Managed wrapper for one host document.
pub struct Document {
    this: Weak<Document>,
    inner: Mutex<DocumentInner>,
    closing: Signal<ClosingEvent>,
    destroyed: Signal<Arc<Document>>,
}

impl Document {
    pub(crate) fn detached(kind: DocumentKind) -> Arc<Self> {
        Self::build(kind, None, String::new(), String::new())
    }

    /// A wrapper for a document the host already has open.
    pub(crate) fn bound(
        kind: DocumentKind,
        handle: DocumentHandle,
        title: String,
        path: String,
    ) -> Arc<Self> {
        Self::build(kind, Some(handle), title, path)
    }

    fn build(
        kind: DocumentKind,
        handle: Option<DocumentHandle>,
        title: String,
        path: String,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            inner: Mutex::new(DocumentInner {
                handle,
                kind,
                title,
                path,
                state: DocumentState::Detached,
                options: OpenOptions::default(),
                close_requested: false,
            }),
            closing: Signal::new("closing"),
            destroyed: Signal::new("destroyed"),
        })
    }

    pub fn handle(&self) -> Option<DocumentHandle> {
        self.inner.lock().handle
    }

    pub fn kind(&self) -> DocumentKind {
        self.inner.lock().kind
    }

    pub fn title(&self) -> String {
        self.inner.lock().title.clone()
    }

    /// File path; empty for documents that were never saved.
    pub fn path(&self) -> String {
        self.inner.lock().path.clone()
    }

    pub fn state(&self) -> DocumentState {
        self.inner.lock().state
    }

    pub fn options(&self) -> OpenOptions {
        self.inner.lock().options
    }

    pub fn is_committed(&self) -> bool {
        self.state() == DocumentState::Open
    }

    /// Display name for logs and errors.
    pub fn name(&self) -> String {
        let inner = self.inner.lock();
        if !inner.title.is_empty() {
            inner.title.clone()
        } else if !inner.path.is_empty() {
            inner.path.clone()
        } else {
            format!("<untitled {}>", inner.kind)
        }
    }

    /// Set the path a detached document will be opened from.
    pub fn set_path(&self, path: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != DocumentState::Detached {
            return Err(RegistryError::Conflict(format!(
                "cannot change the path of committed document '{}'",
                inner.title
            )));
        }
        inner.path = path.into();
        inner.title = paths::file_name(&inner.path).to_string();
        Ok(())
    }

    pub fn set_options(&self, options: OpenOptions) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != DocumentState::Detached {
            return Err(RegistryError::Conflict(format!(
                "cannot change the options of committed document '{}'",
                inner.title
            )));
        }
        inner.options = options;
        Ok(())
    }

    /// Called before the document is released, with the reason.
    pub fn on_closing<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClosingEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.closing.connect(listener)
    }

    /// Called once the document is closed and its handle released.
    pub fn on_destroyed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<Document>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.destroyed.connect(listener)
    }

    pub fn disconnect(&self, id: ListenerId) -> bool {
        self.closing.disconnect(id) || self.destroyed.disconnect(id)
    }

    pub(crate) fn disconnect_destroyed(&self, id: ListenerId) -> bool {
        self.destroyed.disconnect(id)
    }

    /// Bind a detached document to a host handle, refining an untyped kind.
    pub(crate) fn bind(&self, handle: DocumentHandle, title: String, path: String, kind: DocumentKind) {
        let mut inner = self.inner.lock();
        inner.handle = Some(handle);
        inner.title = title;
        inner.path = path;
        if !inner.kind.is_specific() {
            inner.kind = kind;
        }
    }

    pub(crate) fn unbind(&self) {
        let mut inner = self.inner.lock();
        if inner.state == DocumentState::Detached {
            inner.handle = None;
        }
    }

    /// `Detached -> Open`. Returns `false` if the document was not detached.
    pub(crate) fn mark_open(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != DocumentState::Detached || inner.handle.is_none() {
            return false;
        }
        inner.state = DocumentState::Open;
        true
    }

    pub(crate) fn request_close(&self, requested: bool) {
        self.inner.lock().close_requested = requested;
    }

    /// Take an open document through `Closing` to `Closed`, firing `closing`
    /// then `destroyed`. Only the first call does anything.
    pub(crate) fn destroy(&self, reason: CloseReason) -> bool {
        let reason = {
            let mut inner = self.inner.lock();
            if inner.state != DocumentState::Open {
                return false;
            }
            inner.state = DocumentState::Closing;
            if inner.close_requested {
                CloseReason::Close
            } else {
                reason
            }
        };

        let Some(this) = self.this.upgrade() else {
            return false;
        };

        debug!(document = %this.name(), ?reason, "closing document");
        self.closing.emit(&ClosingEvent {
            document: Arc::clone(&this),
            reason,
        });

        {
            let mut inner = self.inner.lock();
            inner.state = DocumentState::Closed;
            inner.handle = None;
        }

        self.destroyed.emit(&this);
        true
    }

    /// Force the document closed without notifying listeners, then drop them.
    pub(crate) fn release(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = DocumentState::Closed;
            inner.handle = None;
        }
        self.closing.clear();
        self.destroyed.clear();
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Document")
            .field("title", &inner.title)
            .field("path", &inner.path)
            .field("kind", &inner.kind)
            .field("state", &inner.state)
            .field("handle", &inner.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_document() -> Arc<Document> {
        let doc = Document::bound(
            DocumentKind::Part,
            DocumentHandle::new(1, 0),
            "Part1.sldprt".to_string(),
            "C:\\a\\Part1.sldprt".to_string(),
        );
        assert!(doc.mark_open());
        doc
    }

    #[test]
    fn detached_document_accepts_path() {
        let doc = Document::detached(DocumentKind::Part);
        assert_eq!(doc.state(), DocumentState::Detached);
        assert!(doc.handle().is_none());

        doc.set_path("C:\\a\\Part1.sldprt").unwrap();
        assert_eq!(doc.title(), "Part1.sldprt");
        assert_eq!(doc.name(), "Part1.sldprt");
    }

    #[test]
    fn untitled_name() {
        let doc = Document::detached(DocumentKind::Assembly);
        assert_eq!(doc.name(), "<untitled assembly>");
    }

    #[test]
    fn committed_document_rejects_path_change() {
        let doc = open_document();
        assert!(matches!(
            doc.set_path("C:\\b\\Part2.sldprt"),
            Err(RegistryError::Conflict(_))
        ));
    }

    #[test]
    fn mark_open_requires_handle() {
        let doc = Document::detached(DocumentKind::Part);
        assert!(!doc.mark_open());
        assert_eq!(doc.state(), DocumentState::Detached);
    }

    #[test]
    fn destroy_fires_closing_then_destroyed_once() {
        let doc = open_document();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sink = log.clone();
        doc.on_closing(move |e: &ClosingEvent| {
            sink.lock()
                .push(format!("closing {:?} {:?}", e.reason, e.document.state()));
            Ok(())
        });
        let sink = log.clone();
        doc.on_destroyed(move |d: &Arc<Document>| {
            sink.lock().push(format!("destroyed {:?}", d.state()));
            Ok(())
        });

        assert!(doc.destroy(CloseReason::Destroy));
        assert!(!doc.destroy(CloseReason::Close));

        assert_eq!(
            *log.lock(),
            vec!["closing Destroy Closing", "destroyed Closed"]
        );
        assert!(doc.handle().is_none());
    }

    #[test]
    fn requested_close_wins_reason() {
        let doc = open_document();
        let reason = Arc::new(Mutex::new(None));
        let sink = reason.clone();
        doc.on_closing(move |e: &ClosingEvent| {
            *sink.lock() = Some(e.reason);
            Ok(())
        });

        doc.request_close(true);
        doc.destroy(CloseReason::Destroy);
        assert_eq!(*reason.lock(), Some(CloseReason::Close));
    }

    #[test]
    fn bind_refines_unknown_kind_only() {
        let unknown = Document::detached(DocumentKind::Unknown);
        unknown.bind(
            DocumentHandle::new(3, 0),
            "Part1".to_string(),
            String::new(),
            DocumentKind::Part,
        );
        assert_eq!(unknown.kind(), DocumentKind::Part);

        let part = Document::detached(DocumentKind::Part);
        part.bind(
            DocumentHandle::new(4, 0),
            "Assem1".to_string(),
            String::new(),
            DocumentKind::Assembly,
        );
        assert_eq!(part.kind(), DocumentKind::Part);
    }

    #[test]
    fn release_is_silent() {
        let doc = open_document();
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        doc.on_destroyed(move |_: &Arc<Document>| {
            *sink.lock() += 1;
            Ok(())
        });

        doc.release();
        assert_eq!(doc.state(), DocumentState::Closed);
        assert!(!doc.destroy(CloseReason::Destroy));
        assert_eq!(*hits.lock(), 0);
    }
}
