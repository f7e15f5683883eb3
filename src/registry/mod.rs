//! The document registry.
//!
//! The registry owns the authoritative set of documents the host has open. It
//! admits wrappers announced by the dispatcher, removes them when the host
//! destroys them (or silently loses them), and offers lookup, activation,
//! creation and closing on top of that set.

mod table;

use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};

use crate::dependencies::{Dependencies, DependencyDescriptor, DependencyResolver};
use crate::dispatch::Dispatcher;
use crate::document::{
    CloseReason, Document, DocumentHandler, DocumentHandlers, DocumentKind, DocumentState,
};
use crate::error::{HostOperation, ListenerError, RegistryError, Result};
use crate::host::{DocumentHandle, Host, HostCode};
use crate::identity::IdentityComparer;
use crate::paths;
use crate::settings::{self, Settings};
use crate::signal::{ListenerId, Signal};

use table::{Entry, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    /// Purge only handles the comparer has already seen dead.
    Cached,
    /// Also check every entry and queued activation.
    Full,
}

pub(crate) struct Inner {
    host: Arc<dyn Host>,
    comparer: Arc<IdentityComparer>,
    dispatcher: Dispatcher,
    resolver: DependencyResolver,
    handlers: DocumentHandlers,
    table: ReentrantMutex<RefCell<Table>>,
    document_created: Signal<Arc<Document>>,
    document_activated: Signal<Arc<Document>>,
}

/// Registry of the documents open in one host connection.
///
/// Cloning is cheap and yields another handle to the same registry. Every
/// operation runs synchronously on the caller's thread and may be re-entered
/// from host callbacks fired during that operation.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// A registry with default settings.
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::with_settings(host, &Settings::default(), Path::new("."))
    }

    /// A registry configured from `settings`. Relative search folders are
    /// resolved against `settings_dir`.
    pub fn with_settings(host: Arc<dyn Host>, settings: &Settings, settings_dir: &Path) -> Self {
        let kinds = settings::build_kind_resolver(settings);
        let resolver = DependencyResolver::new(
            kinds.clone(),
            settings::reference_search_folders(settings, settings_dir),
            settings.cache_folders(),
        );
        let comparer = Arc::new(IdentityComparer::new(Arc::clone(&host)));

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let dispatcher = Dispatcher::new(Arc::clone(&host), Arc::clone(&comparer), kinds);
            let weak = weak.clone();
            dispatcher.on_dispatched(move |document: &Arc<Document>| {
                if let Some(inner) = weak.upgrade() {
                    inner.admit(document);
                }
                Ok(())
            });
            Inner {
                host,
                comparer,
                dispatcher,
                resolver,
                handlers: DocumentHandlers::default(),
                table: ReentrantMutex::new(RefCell::new(Table::default())),
                document_created: Signal::new("document_created"),
                document_activated: Signal::new("document_activated"),
            }
        });
        Self { inner }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    pub fn comparer(&self) -> &Arc<IdentityComparer> {
        &self.inner.comparer
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Register every document the host already has open, then subscribe to
    /// load and activation notifications. Calling it again does nothing.
    pub fn attach(&self) {
        let inner = &self.inner;
        let guard = inner.table.lock();
        {
            let mut table = guard.borrow_mut();
            if table.attached {
                return;
            }
            table.attached = true;
        }

        let open = inner.host.enumerate_open_documents();
        info!(documents = open.len(), "attaching to host");
        for handle in open {
            if inner.dispatcher.dispatch_handle(handle).is_none() {
                warn!(%handle, "failed to attach open document");
            }
        }

        let weak = Arc::downgrade(inner);
        let load = inner.host.subscribe_load(Arc::new(move |title: &str, path: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatcher.dispatch(title, path);
            }
        }));
        let weak = Arc::downgrade(inner);
        let activate = inner
            .host
            .subscribe_activate(Arc::new(move |handle: DocumentHandle| {
                if let Some(inner) = weak.upgrade() {
                    inner.activated(handle);
                }
            }));
        guard.borrow_mut().subscriptions.extend([load, activate]);
    }

    /// Unsubscribe from the host and release every document without firing
    /// any events. The registry may be attached again afterwards.
    pub fn detach(&self) {
        self.inner.teardown();
    }

    pub fn is_attached(&self) -> bool {
        self.inner.table.lock().borrow().attached
    }

    /// A new detached document of `kind`.
    pub fn pre_create(&self, kind: DocumentKind) -> Result<Arc<Document>> {
        if !self.inner.dispatcher.kinds().is_creatable(kind) {
            return Err(RegistryError::UnsupportedKind(kind.to_string()));
        }
        Ok(Document::detached(kind))
    }

    /// A new detached document typed from the extension of `path`.
    pub fn pre_create_from_path(&self, path: &str) -> Result<Arc<Document>> {
        let kind = self
            .inner
            .dispatcher
            .kinds()
            .resolve(path)
            .ok_or_else(|| RegistryError::UnsupportedKind(format!("no kind for '{path}'")))?;
        let document = self.pre_create(kind)?;
        document.set_path(path)?;
        Ok(document)
    }

    /// Open (or create, when it has no path) a detached document in the host.
    ///
    /// Committing a path that is already registered returns the registered
    /// document when `document` is untyped and fails with `AlreadyOpen`
    /// otherwise.
    pub fn commit(&self, document: &Arc<Document>) -> Result<Arc<Document>> {
        match document.state() {
            DocumentState::Detached => {}
            DocumentState::Open => return Err(RegistryError::Conflict(document.name())),
            DocumentState::Closing | DocumentState::Closed => {
                return Err(RegistryError::Closed(document.name()))
            }
        }

        let inner = &self.inner;
        let kind = document.kind();
        let path = document.path();
        if !path.is_empty() {
            if let Some(resolved) = inner.dispatcher.kinds().resolve(&path) {
                if kind.is_specific() && resolved != kind {
                    return Err(RegistryError::UnsupportedKind(format!(
                        "'{path}' is not a {kind}"
                    )));
                }
            }
            if let Some(existing) = self.find_by_path(&path) {
                return if kind.is_specific() {
                    Err(RegistryError::AlreadyOpen(path))
                } else {
                    Ok(existing)
                };
            }
        }

        inner.dispatcher.begin_dispatch(Arc::clone(document));
        let opened = if path.is_empty() {
            inner
                .host
                .create(kind)
                .map_err(|code| RegistryError::OpenFailed {
                    path: document.name(),
                    code,
                })
        } else {
            inner
                .host
                .open(&path, document.options())
                .map_err(|code| RegistryError::OpenFailed {
                    path: path.clone(),
                    code,
                })
        };
        inner.dispatcher.end_dispatch(document);

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                document.unbind();
                return Err(e);
            }
        };

        // The host may open without a load notification.
        if document.handle().is_none() && document.state() == DocumentState::Detached {
            let title = inner.host.title(handle).unwrap_or_else(|| document.title());
            let host_path = inner.host.path(handle).unwrap_or_else(|| path.clone());
            let resolved = inner.dispatcher.resolve_kind(handle, &host_path);
            document.bind(handle, title, host_path, resolved);
            inner.dispatcher.announce(document);
        }

        if document.state() != DocumentState::Detached {
            return Ok(Arc::clone(document));
        }

        document.unbind();
        match inner.lookup(handle) {
            Some(existing) if !kind.is_specific() => Ok(existing),
            Some(existing) => Err(RegistryError::AlreadyOpen(existing.name())),
            None => Err(RegistryError::Conflict(document.name())),
        }
    }

    /// Commit each document in order, stopping at the first failure.
    pub fn add_range<'a, I>(&self, documents: I) -> Result<Vec<Arc<Document>>>
    where
        I: IntoIterator<Item = &'a Arc<Document>>,
    {
        documents
            .into_iter()
            .map(|document| self.commit(document))
            .collect()
    }

    /// Close a registered document in the host.
    ///
    /// Closing a document that is already closing or closed does nothing.
    pub fn close(&self, document: &Arc<Document>) -> Result<()> {
        match document.state() {
            DocumentState::Detached => return Err(RegistryError::Detached(document.name())),
            DocumentState::Closing | DocumentState::Closed => return Ok(()),
            DocumentState::Open => {}
        }
        let Some(handle) = document.handle() else {
            return Ok(());
        };

        document.request_close(true);
        if let Err(code) = self.inner.host.close(handle) {
            document.request_close(false);
            if !self.inner.comparer.is_alive(handle) {
                self.inner.comparer.mark_dangling(handle);
                self.inner.sweep(Sweep::Cached);
                return Err(RegistryError::StaleHandle(handle));
            }
            return Err(RegistryError::host(HostOperation::Close, code));
        }
        document.destroy(CloseReason::Close);
        Ok(())
    }

    /// Close every document, continuing past failures. Returns the first error.
    pub fn remove_range<'a, I>(&self, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Arc<Document>>,
    {
        let mut first_error = None;
        for document in documents {
            if let Err(e) = self.close(document) {
                warn!(document = %document.name(), error = %e, "failed to close document");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Registered document for `handle`.
    pub fn get(&self, handle: DocumentHandle) -> Result<Arc<Document>> {
        self.inner.sweep(Sweep::Cached);
        self.inner
            .lookup(handle)
            .ok_or_else(|| RegistryError::NotFound(handle.to_string()))
    }

    /// Registered document with the given title or path.
    pub fn try_get(&self, name: &str) -> Option<Arc<Document>> {
        self.inner.sweep(Sweep::Cached);
        let handle = self.inner.host.find_open_document(name)?;
        self.inner.lookup(handle)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<Document>> {
        self.try_get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered document at `path`, compared case-insensitively.
    pub fn find_by_path(&self, path: &str) -> Option<Arc<Document>> {
        if path.is_empty() {
            return None;
        }
        self.documents()
            .into_iter()
            .find(|d| paths::same_path(&d.path(), path))
    }

    /// The host's active document, if it is registered.
    pub fn active(&self) -> Option<Arc<Document>> {
        let handle = self.inner.host.active_document()?;
        self.inner.lookup(handle)
    }

    pub fn set_active(&self, document: &Arc<Document>) -> Result<()> {
        match document.state() {
            DocumentState::Detached => return Err(RegistryError::Detached(document.name())),
            DocumentState::Closing | DocumentState::Closed => {
                return Err(RegistryError::Closed(document.name()))
            }
            DocumentState::Open => {}
        }
        let Some(handle) = document.handle() else {
            return Err(RegistryError::Closed(document.name()));
        };
        if !self.inner.comparer.is_alive(handle) {
            self.inner.comparer.mark_dangling(handle);
            self.inner.sweep(Sweep::Cached);
            return Err(RegistryError::StaleHandle(handle));
        }
        self.inner
            .host
            .activate(handle)
            .map_err(|code| RegistryError::host(HostOperation::Activate, code))
    }

    /// Number of registered documents, after purging dead ones.
    pub fn count(&self) -> usize {
        self.inner.sweep(Sweep::Full);
        self.inner.table.lock().borrow().entries.len()
    }

    /// Registered documents in admission order, after purging dead ones.
    pub fn documents(&self) -> Vec<Arc<Document>> {
        self.inner.sweep(Sweep::Full);
        self.inner
            .table
            .lock()
            .borrow()
            .entries
            .iter()
            .map(|e| Arc::clone(&e.document))
            .collect()
    }

    /// Whether `document` is currently registered.
    pub fn contains(&self, document: &Arc<Document>) -> bool {
        self.inner.table.lock().borrow().contains(document)
    }

    pub fn on_document_created<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<Document>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.document_created.connect(listener)
    }

    pub fn on_document_activated<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<Document>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.document_activated.connect(listener)
    }

    pub fn disconnect(&self, id: ListenerId) -> bool {
        self.inner.document_created.disconnect(id) || self.inner.document_activated.disconnect(id)
    }

    /// Attach a handler of type `H` to every registered document, current and
    /// future. Returns `false` if `H` was already registered.
    pub fn register_handler<H, F>(&self, factory: F) -> bool
    where
        H: DocumentHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        if !self.inner.handlers.register(factory) {
            return false;
        }
        for document in self.documents() {
            self.inner.handlers.init(&document);
        }
        true
    }

    pub fn handler<H: DocumentHandler>(&self, document: &Arc<Document>) -> Option<Arc<H>> {
        self.inner.handlers.get::<H>(document)
    }

    /// Walk the references of the document at `path` without opening anything.
    pub fn iterate_dependencies(&self, path: &str) -> Dependencies {
        Dependencies::new(self.clone(), path)
    }

    pub fn dependencies_of(&self, document: &Arc<Document>) -> Dependencies {
        self.iterate_dependencies(&document.path())
    }

    /// Open the document a dependency descriptor points at.
    pub fn commit_dependency(&self, descriptor: &DependencyDescriptor) -> Result<Arc<Document>> {
        if let Some(document) = &descriptor.document {
            if document.is_committed() {
                return Ok(Arc::clone(document));
            }
        }
        if let Some(document) = self.find_by_path(&descriptor.path) {
            return Ok(document);
        }
        if descriptor.is_virtual && self.find_by_path(&descriptor.parent).is_none() {
            return Err(RegistryError::OpenFailed {
                path: descriptor.path.clone(),
                code: HostCode::FILE_NOT_FOUND,
            });
        }

        let document = self.pre_create(descriptor.kind)?;
        document.set_path(descriptor.path.as_str())?;
        self.commit(&document)
    }

    /// Drop cached folder listings used by dependency walks.
    pub fn clear_cache(&self) {
        self.inner.resolver.clear_cache();
    }

    pub(crate) fn resolver(&self) -> &DependencyResolver {
        &self.inner.resolver
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.table.lock();
        let table = guard.borrow();
        f.debug_struct("Registry")
            .field("attached", &table.attached)
            .field("documents", &table.entries.len())
            .field("pending_activations", &table.pending_activations.len())
            .finish()
    }
}

impl Inner {
    /// Registered document for `handle`, by host identity.
    fn lookup(&self, handle: DocumentHandle) -> Option<Arc<Document>> {
        let guard = self.table.lock();
        let snapshot = guard.borrow().snapshot();
        snapshot
            .into_iter()
            .find(|(registered, _)| self.comparer.are_same(*registered, handle))
            .map(|(_, document)| document)
    }

    /// Admit a dispatched wrapper unless its document is already registered.
    fn admit(self: &Arc<Self>, document: &Arc<Document>) {
        let guard = self.table.lock();
        self.sweep(Sweep::Cached);

        let Some(handle) = document.handle() else {
            warn!(document = %document.name(), "dispatched document has no handle");
            return;
        };
        if let Some(existing) = self.lookup(handle) {
            if !Arc::ptr_eq(&existing, document) {
                warn!(%handle, document = %document.name(), "document already registered, dropping duplicate");
            }
            return;
        }
        if !document.mark_open() {
            warn!(%handle, state = ?document.state(), "cannot admit document");
            return;
        }

        let weak = Arc::downgrade(self);
        let destroyed_listener = document.on_destroyed(move |document: &Arc<Document>| {
            if let Some(inner) = weak.upgrade() {
                inner.remove(document);
            }
            Ok(())
        });
        let weak_document = Arc::downgrade(document);
        let destroy_subscription = self.host.subscribe_destroy(
            handle,
            Arc::new(move |_: DocumentHandle| {
                if let Some(document) = weak_document.upgrade() {
                    document.destroy(CloseReason::Destroy);
                }
            }),
        );

        guard.borrow_mut().entries.push(Entry {
            handle,
            document: Arc::clone(document),
            destroyed_listener,
            destroy_subscription,
        });
        info!(%handle, document = %document.name(), kind = %document.kind(), "document registered");

        self.handlers.init(document);
        self.document_created.emit(document);

        if self.take_pending_activation(handle) && document.is_committed() {
            debug!(%handle, "replaying activation");
            self.document_activated.emit(document);
        }
    }

    fn take_pending_activation(&self, handle: DocumentHandle) -> bool {
        let guard = self.table.lock();
        let pending = guard.borrow().pending_activations.clone();
        let Some(index) = pending
            .iter()
            .position(|queued| self.comparer.are_same(*queued, handle))
        else {
            return false;
        };
        guard.borrow_mut().pending_activations.remove(index);
        true
    }

    fn activated(&self, handle: DocumentHandle) {
        let guard = self.table.lock();
        if let Some(document) = self.lookup(handle) {
            self.document_activated.emit(&document);
            return;
        }
        if !self.comparer.is_alive(handle) {
            return;
        }

        let pending = guard.borrow().pending_activations.clone();
        if pending
            .iter()
            .any(|queued| self.comparer.are_same(*queued, handle))
        {
            return;
        }
        debug!(%handle, "activation before load, queued");
        guard.borrow_mut().pending_activations.push(handle);
    }

    /// Drop an entry whose document reported itself destroyed.
    fn remove(&self, document: &Arc<Document>) {
        let guard = self.table.lock();
        let entry = guard.borrow_mut().remove(document);
        if let Some(entry) = entry {
            debug!(handle = %entry.handle, document = %document.name(), "document removed");
            self.retire(entry);
        }
        drop(guard);
        self.sweep(Sweep::Cached);
    }

    fn retire(&self, entry: Entry) {
        self.host.unsubscribe(entry.destroy_subscription);
        entry.document.disconnect_destroyed(entry.destroyed_listener);
        self.handlers.release(&entry.document);
    }

    /// Remove entries whose handles died without a destroy notification.
    fn sweep(&self, mode: Sweep) {
        let guard = self.table.lock();
        let dangling = self.comparer.take_dangling();
        let check_all = mode == Sweep::Full && {
            let table = guard.borrow();
            !table.entries.is_empty() || !table.pending_activations.is_empty()
        };
        if dangling.is_empty() && !check_all {
            return;
        }

        let snapshot = guard.borrow().snapshot();
        let stale: Vec<_> = snapshot
            .into_iter()
            .filter(|(handle, _)| {
                (check_all || dangling.iter().any(|d| d.same_token(handle)))
                    && !self.host.is_alive(*handle)
            })
            .map(|(_, document)| document)
            .collect();

        if check_all {
            let pending = guard.borrow().pending_activations.clone();
            let alive: Vec<_> = pending
                .into_iter()
                .filter(|h| self.host.is_alive(*h))
                .collect();
            guard.borrow_mut().pending_activations = alive;
        }

        let mut removed = Vec::new();
        {
            let mut table = guard.borrow_mut();
            for document in &stale {
                removed.extend(table.remove(document));
            }
        }
        drop(guard);

        for entry in removed {
            warn!(handle = %entry.handle, document = %entry.document.name(), "removing dangling document");
            let document = Arc::clone(&entry.document);
            self.retire(entry);
            document.destroy(CloseReason::Stale);
        }
    }

    fn teardown(&self) {
        let guard = self.table.lock();
        let (subscriptions, entries) = {
            let mut table = guard.borrow_mut();
            table.attached = false;
            table.pending_activations.clear();
            (
                std::mem::take(&mut table.subscriptions),
                std::mem::take(&mut table.entries),
            )
        };
        if !entries.is_empty() || !subscriptions.is_empty() {
            debug!(documents = entries.len(), "detaching from host");
        }

        for id in subscriptions {
            self.host.unsubscribe(id);
        }
        for entry in entries {
            let document = Arc::clone(&entry.document);
            self.retire(entry);
            document.release();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}
