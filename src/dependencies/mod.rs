//! Dependency walking.
//!
//! A walk starts at a document path and yields every direct and transitive
//! reference the host reports, resolving on-disk files through a shared
//! folder cache. Nothing is opened while walking.

mod descriptor;
mod folder_cache;
mod resolver;

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::paths;
use crate::registry::Registry;

pub use descriptor::DependencyDescriptor;
pub use folder_cache::FolderCache;
pub use resolver::{is_virtual_path, virtual_id, DependencyResolver};

/// Lazy, depth-first walk over a document's references.
///
/// Host references are only enumerated when the iterator needs the next
/// item. Each document is yielded once, even when several documents refer to
/// it. Unresolved references are yielded but not expanded.
pub struct Dependencies {
    registry: Registry,
    stack: Vec<String>,
    ready: VecDeque<DependencyDescriptor>,
    visited: HashSet<String>,
}

impl Dependencies {
    pub(crate) fn new(registry: Registry, root: &str) -> Self {
        let mut visited = HashSet::new();
        visited.insert(paths::path_key(root));
        Self {
            registry,
            stack: vec![root.to_string()],
            ready: VecDeque::new(),
            visited,
        }
    }

    /// Collect the remaining dependencies.
    pub fn snapshot(self) -> Vec<DependencyDescriptor> {
        self.collect()
    }

    fn expand(&mut self, owner: &str) {
        let host = self.registry.host();
        let references = match host.enumerate_references(owner) {
            Ok(references) => references,
            Err(code) => {
                debug!(owner, %code, "cannot enumerate references");
                return;
            }
        };

        let mut children = Vec::new();
        for reference in &references {
            let mut descriptor = self.registry.resolver().describe(host, owner, reference);
            descriptor.document = reference
                .open
                .and_then(|handle| self.registry.get(handle).ok())
                .or_else(|| self.registry.find_by_path(&descriptor.path));
            if let Some(document) = &descriptor.document {
                let live_path = document.path();
                if !live_path.is_empty() {
                    descriptor.path = live_path;
                }
                descriptor.resolved = true;
            }

            if !self.visited.insert(paths::path_key(&descriptor.path)) {
                continue;
            }
            if descriptor.resolved {
                children.push(descriptor.path.clone());
            }
            self.ready.push_back(descriptor);
        }

        // Reverse so the first reference is expanded first.
        self.stack.extend(children.into_iter().rev());
    }
}

impl Iterator for Dependencies {
    type Item = DependencyDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(descriptor) = self.ready.pop_front() {
                return Some(descriptor);
            }
            let owner = self.stack.pop()?;
            self.expand(&owner);
        }
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("pending", &self.stack.len())
            .field("ready", &self.ready.len())
            .field("visited", &self.visited.len())
            .finish()
    }
}
