//! In-process host with a simulated file table.
//!
//! `MemoryHost` behaves like a well-mannered host by default: opening a file
//! fires a load notification followed by an activation, closing fires the
//! per-document destroy notification. Switches let callers reproduce the
//! misbehaviour real hosts show (duplicate or missing notifications,
//! activation racing ahead of load, silent handle invalidation, slot reuse).

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::{
    ActivateCallback, DestroyCallback, DocumentHandle, Host, HostCode, HostReference,
    LoadCallback, OpaqueId, OpenOptions, ReferenceTarget, SubscriptionId,
};
use crate::document::DocumentKind;
use crate::paths;

#[derive(Debug, Clone)]
struct HostDocument {
    handle: DocumentHandle,
    id: OpaqueId,
    title: String,
    path: String,
    kind: Option<DocumentKind>,
}

#[derive(Debug, Clone)]
struct FileRecord {
    kind: DocumentKind,
    references: Vec<HostReference>,
}

#[derive(Default)]
struct HostState {
    next_slot: u64,
    next_id: u64,
    next_subscription: u64,
    generations: HashMap<u64, u32>,
    free_slots: Vec<u64>,
    reuse_slots: bool,
    documents: Vec<HostDocument>,
    files: HashMap<String, FileRecord>,
    active: Option<DocumentHandle>,
    untitled: HashMap<DocumentKind, u32>,
    search_folders: Vec<PathBuf>,
    load_subscribers: Vec<(SubscriptionId, LoadCallback)>,
    activate_subscribers: Vec<(SubscriptionId, ActivateCallback)>,
    destroy_subscribers: Vec<(SubscriptionId, DocumentHandle, DestroyCallback)>,
    suppress_loads: bool,
    activate_before_load: bool,
    activation_error: Option<HostCode>,
    close_error: Option<HostCode>,
}

impl HostState {
    fn allocate_handle(&mut self) -> DocumentHandle {
        if self.reuse_slots {
            if let Some(slot) = self.free_slots.pop() {
                let generation = self.generations.entry(slot).or_insert(0);
                *generation += 1;
                return DocumentHandle::new(slot, *generation);
            }
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.generations.insert(slot, 0);
        DocumentHandle::new(slot, 0)
    }

    fn position(&self, handle: DocumentHandle) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| d.handle.same_token(&handle))
    }

    fn document(&self, handle: DocumentHandle) -> Option<&HostDocument> {
        self.position(handle).map(|i| &self.documents[i])
    }

    fn find_by_path(&self, path: &str) -> Option<&HostDocument> {
        self.documents
            .iter()
            .find(|d| !d.path.is_empty() && d.path.eq_ignore_ascii_case(path))
    }

    /// Remove a document and return the destroy callbacks registered for it.
    fn remove(&mut self, handle: DocumentHandle) -> Vec<DestroyCallback> {
        let Some(index) = self.position(handle) else {
            return Vec::new();
        };
        self.documents.remove(index);
        self.free_slots.push(handle.slot());

        if self
            .active
            .is_some_and(|active| active.same_token(&handle))
        {
            self.active = self.documents.last().map(|d| d.handle);
        }

        let mut callbacks = Vec::new();
        self.destroy_subscribers.retain(|(_, h, cb)| {
            if h.same_token(&handle) {
                callbacks.push(cb.clone());
                false
            } else {
                true
            }
        });
        callbacks
    }

    fn subscription(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }
}

/// A host that lives entirely in memory.
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                next_slot: 1,
                ..Default::default()
            }),
        }
    }

    /// Make a file available for `open`.
    pub fn add_file(&self, path: impl Into<String>, kind: DocumentKind) {
        let path = path.into();
        self.state.lock().files.insert(
            path.to_lowercase(),
            FileRecord {
                kind,
                references: Vec::new(),
            },
        );
    }

    /// Record a reference held by the document at `path` (a file or virtual id).
    pub fn add_reference(&self, path: &str, reference: HostReference) {
        let mut state = self.state.lock();
        let record = state
            .files
            .entry(path.to_lowercase())
            .or_insert_with(|| FileRecord {
                kind: DocumentKind::from_extension(path),
                references: Vec::new(),
            });
        record.references.push(reference);
    }

    pub fn set_reference_search_folders(&self, folders: Vec<PathBuf>) {
        self.state.lock().search_folders = folders;
    }

    /// Stop firing load notifications on open/create.
    pub fn set_suppress_loads(&self, suppress: bool) {
        self.state.lock().suppress_loads = suppress;
    }

    /// Fire the activation notification before the load notification.
    pub fn set_activate_before_load(&self, enabled: bool) {
        self.state.lock().activate_before_load = enabled;
    }

    /// Hand freed slots to new documents, with a bumped generation.
    pub fn set_reuse_slots(&self, enabled: bool) {
        self.state.lock().reuse_slots = enabled;
    }

    pub fn fail_activation(&self, code: Option<HostCode>) {
        self.state.lock().activation_error = code;
    }

    pub fn fail_close(&self, code: Option<HostCode>) {
        self.state.lock().close_error = code;
    }

    /// Drop a document without telling anyone, as a crashed host would.
    pub fn invalidate(&self, handle: DocumentHandle) {
        let _ = self.state.lock().remove(handle);
    }

    /// Fire a load notification as if the host had just loaded `path`.
    pub fn fire_load(&self, title: &str, path: &str) {
        let callbacks: Vec<_> = {
            let state = self.state.lock();
            state
                .load_subscribers
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        for cb in callbacks {
            cb(title, path);
        }
    }

    /// Fire an activation notification for `handle`.
    pub fn fire_activate(&self, handle: DocumentHandle) {
        let callbacks: Vec<_> = {
            let state = self.state.lock();
            state
                .activate_subscribers
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        for cb in callbacks {
            cb(handle);
        }
    }

    /// Total number of live subscriptions of every kind.
    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock();
        state.load_subscribers.len()
            + state.activate_subscribers.len()
            + state.destroy_subscribers.len()
    }

    fn admit(&self, title: String, path: String, kind: Option<DocumentKind>) -> DocumentHandle {
        let (handle, suppress, activate_first) = {
            let mut state = self.state.lock();
            let handle = state.allocate_handle();
            state.next_id += 1;
            let id = OpaqueId(state.next_id);
            state.documents.push(HostDocument {
                handle,
                id,
                title: title.clone(),
                path: path.clone(),
                kind,
            });
            state.active = Some(handle);
            (handle, state.suppress_loads, state.activate_before_load)
        };

        if activate_first {
            self.fire_activate(handle);
        }
        if !suppress {
            self.fire_load(&title, &path);
        }
        if !activate_first {
            self.fire_activate(handle);
        }
        handle
    }
}

impl Host for MemoryHost {
    fn enumerate_open_documents(&self) -> Vec<DocumentHandle> {
        self.state.lock().documents.iter().map(|d| d.handle).collect()
    }

    fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }

    fn identity(&self, handle: DocumentHandle) -> Option<OpaqueId> {
        self.state.lock().document(handle).map(|d| d.id)
    }

    fn is_alive(&self, handle: DocumentHandle) -> bool {
        self.state.lock().position(handle).is_some()
    }

    fn title(&self, handle: DocumentHandle) -> Option<String> {
        self.state.lock().document(handle).map(|d| d.title.clone())
    }

    fn path(&self, handle: DocumentHandle) -> Option<String> {
        self.state.lock().document(handle).map(|d| d.path.clone())
    }

    fn kind(&self, handle: DocumentHandle) -> Option<DocumentKind> {
        self.state.lock().document(handle).and_then(|d| d.kind)
    }

    fn find_open_document(&self, name: &str) -> Option<DocumentHandle> {
        let state = self.state.lock();
        state
            .find_by_path(name)
            .or_else(|| {
                state
                    .documents
                    .iter()
                    .find(|d| d.title.eq_ignore_ascii_case(name))
            })
            .map(|d| d.handle)
    }

    fn open(&self, path: &str, _options: OpenOptions) -> Result<DocumentHandle, HostCode> {
        let kind = {
            let state = self.state.lock();
            if let Some(existing) = state.find_by_path(path) {
                return Ok(existing.handle);
            }
            match state.files.get(&path.to_lowercase()) {
                Some(record) => record.kind,
                None => return Err(HostCode::FILE_NOT_FOUND),
            }
        };

        let title = paths::file_name(path).to_string();
        let kind = (kind != DocumentKind::Unknown).then_some(kind);
        Ok(self.admit(title, path.to_string(), kind))
    }

    fn create(&self, kind: DocumentKind) -> Result<DocumentHandle, HostCode> {
        let prefix = match kind {
            DocumentKind::Part => "Part",
            DocumentKind::Assembly => "Assem",
            DocumentKind::Drawing => "Draw",
            DocumentKind::Unknown => return Err(HostCode::NOT_SUPPORTED),
        };
        let title = {
            let mut state = self.state.lock();
            let counter = state.untitled.entry(kind).or_insert(0);
            *counter += 1;
            format!("{prefix}{counter}")
        };
        Ok(self.admit(title, String::new(), Some(kind)))
    }

    fn activate(&self, handle: DocumentHandle) -> Result<(), HostCode> {
        {
            let mut state = self.state.lock();
            if let Some(code) = state.activation_error {
                return Err(code);
            }
            if state.position(handle).is_none() {
                return Err(HostCode::INVALID_HANDLE);
            }
            state.active = Some(handle);
        }
        self.fire_activate(handle);
        Ok(())
    }

    fn active_document(&self) -> Option<DocumentHandle> {
        self.state.lock().active
    }

    fn close(&self, handle: DocumentHandle) -> Result<(), HostCode> {
        let (callbacks, next_active) = {
            let mut state = self.state.lock();
            if let Some(code) = state.close_error {
                return Err(code);
            }
            if state.position(handle).is_none() {
                return Err(HostCode::INVALID_HANDLE);
            }
            let was_active = state
                .active
                .is_some_and(|active| active.same_token(&handle));
            let callbacks = state.remove(handle);
            (callbacks, if was_active { state.active } else { None })
        };

        for cb in callbacks {
            cb(handle);
        }
        if let Some(active) = next_active {
            self.fire_activate(active);
        }
        Ok(())
    }

    fn subscribe_load(&self, callback: LoadCallback) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = state.subscription();
        state.load_subscribers.push((id, callback));
        id
    }

    fn subscribe_activate(&self, callback: ActivateCallback) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = state.subscription();
        state.activate_subscribers.push((id, callback));
        id
    }

    fn subscribe_destroy(
        &self,
        handle: DocumentHandle,
        callback: DestroyCallback,
    ) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = state.subscription();
        state.destroy_subscribers.push((id, handle, callback));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        state.load_subscribers.retain(|(sid, _)| *sid != id);
        state.activate_subscribers.retain(|(sid, _)| *sid != id);
        state.destroy_subscribers.retain(|(sid, _, _)| *sid != id);
    }

    fn enumerate_references(&self, path: &str) -> Result<Vec<HostReference>, HostCode> {
        let state = self.state.lock();
        let record = state
            .files
            .get(&path.to_lowercase())
            .ok_or(HostCode::FILE_NOT_FOUND)?;

        let references = record
            .references
            .iter()
            .map(|reference| {
                let mut reference = reference.clone();
                if reference.open.is_none() {
                    if let ReferenceTarget::Path(stored) = &reference.target {
                        reference.open = state.find_by_path(stored).map(|d| d.handle);
                    }
                }
                reference
            })
            .collect();
        Ok(references)
    }

    fn reference_search_folders(&self) -> Vec<PathBuf> {
        self.state.lock().search_folders.clone()
    }
}
