use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::trace;

use super::descriptor::DependencyDescriptor;
use super::folder_cache::FolderCache;
use crate::document::{DocumentKind, KindResolver};
use crate::host::{Host, HostReference, ReferenceTarget};
use crate::paths;

/// `<component>^<owner>[.<ext>]`. Owner titles may contain dots.
static VIRTUAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<component>[^\^/\\]+)\^(?P<owner>[^\^/\\]+)$").unwrap());

/// Whether the file name of `path` is a virtual component id.
pub fn is_virtual_path(path: &str) -> bool {
    VIRTUAL_NAME.is_match(paths::file_name(path))
}

/// Synthetic id for `component` living inside the document at `owner`.
///
/// The id sits next to the owner so that references stored relative to a
/// virtual component resolve against the owner's folder. Nested owners have
/// their own `^` replaced so the id stays parseable.
pub fn virtual_id(owner: &str, component: &str, kind: DocumentKind) -> String {
    let (stem, ext) = match paths::extension(component) {
        Some(ext) => (paths::file_stem(component), Some(ext)),
        None => (component, kind.native_extension()),
    };
    let owner_stem = paths::file_stem(owner).replace('^', "_");
    let name = match ext {
        Some(ext) => format!("{stem}^{owner_stem}.{ext}"),
        None => format!("{stem}^{owner_stem}"),
    };
    match paths::parent(owner) {
        Some(dir) => {
            let separator = &owner[dir.len()..dir.len() + 1];
            format!("{dir}{separator}{name}")
        }
        None => name,
    }
}

/// Turns host references into descriptors, locating on-disk files.
#[derive(Debug)]
pub struct DependencyResolver {
    kinds: KindResolver,
    search_folders: Vec<PathBuf>,
    cache: FolderCache,
}

impl DependencyResolver {
    pub fn new(kinds: KindResolver, search_folders: Vec<PathBuf>, cache_folders: bool) -> Self {
        Self {
            kinds,
            search_folders,
            cache: FolderCache::new(cache_folders),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_folders(&self) -> usize {
        self.cache.len()
    }

    /// Describe `reference` held by the document at `owner`. The descriptor's
    /// `document` is left for the caller to fill in.
    pub fn describe(
        &self,
        host: &Arc<dyn Host>,
        owner: &str,
        reference: &HostReference,
    ) -> DependencyDescriptor {
        let (path, kind, is_virtual, resolved) = match &reference.target {
            ReferenceTarget::Virtual { component, kind } => {
                (virtual_id(owner, component, *kind), *kind, true, true)
            }
            ReferenceTarget::Path(stored) if is_virtual_path(stored) => {
                (stored.clone(), self.kind_of(stored), true, true)
            }
            ReferenceTarget::Path(stored) => match self.locate(host, owner, stored) {
                Some(found) => {
                    let found = found.to_string_lossy().into_owned();
                    (found, self.kind_of(stored), false, true)
                }
                None => (stored.clone(), self.kind_of(stored), false, false),
            },
        };

        DependencyDescriptor {
            path,
            kind,
            is_virtual,
            resolved,
            parent: owner.to_string(),
            document: None,
        }
    }

    fn kind_of(&self, path: &str) -> DocumentKind {
        self.kinds.resolve(path).unwrap_or(DocumentKind::Unknown)
    }

    /// Probe, in order: the referencing document's folder, the host's search
    /// folders, the configured search folders, the stored location.
    fn locate(&self, host: &Arc<dyn Host>, owner: &str, stored: &str) -> Option<PathBuf> {
        let name = paths::file_name(stored);
        let mut folders = Vec::new();
        if let Some(dir) = paths::parent(owner) {
            folders.push(PathBuf::from(dir));
        }
        folders.extend(host.reference_search_folders());
        folders.extend(self.search_folders.iter().cloned());
        if let Some(dir) = paths::parent(stored) {
            folders.push(PathBuf::from(dir));
        }

        folders.iter().find_map(|folder| {
            let found = self.probe(folder, name);
            trace!(folder = %folder.display(), name, found = found.is_some(), "probing");
            found
        })
    }

    fn probe(&self, folder: &Path, name: &str) -> Option<PathBuf> {
        if folder.as_os_str().is_empty() {
            return None;
        }
        self.cache.find(folder, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    #[test]
    fn virtual_ids() {
        assert_eq!(
            virtual_id("C:\\a\\Assem1.sldasm", "Part1", DocumentKind::Part),
            "C:\\a\\Part1^Assem1.sldprt"
        );
        assert_eq!(
            virtual_id("/a/Part3^Assem1.sldasm", "Part5.sldprt", DocumentKind::Unknown),
            "/a/Part5^Part3_Assem1.sldprt"
        );
        assert_eq!(virtual_id("Assem1", "Comp", DocumentKind::Unknown), "Comp^Assem1");
        assert!(is_virtual_path("C:\\a\\Part1^Assem1.sldprt"));
        assert!(is_virtual_path("/a/Part5^Part3_Assem1.sldprt"));
        assert!(!is_virtual_path("C:\\a\\Part1.sldprt"));
        assert!(!is_virtual_path("C:\\a^b\\Part1.sldprt"));
    }

    #[test]
    fn dotted_owner_ids_are_recognised() {
        let id = virtual_id("/a/Assem1.v2.sldasm", "Part1", DocumentKind::Part);
        assert_eq!(id, "/a/Part1^Assem1.v2.sldprt");
        assert!(is_virtual_path(&id));
        assert!(is_virtual_path(&virtual_id("C:\\a\\Rev.B.sldasm", "Brace", DocumentKind::Unknown)));

        let host: Arc<dyn Host> = Arc::new(MemoryHost::new());
        let resolver = DependencyResolver::new(KindResolver::default(), Vec::new(), true);
        let d = resolver.describe(&host, "/a/Assem1.v2.sldasm", &HostReference::path(&id));
        assert!(d.is_virtual && d.resolved);
        assert_eq!(d.path, id);
        assert_eq!(d.kind, DocumentKind::Part);
        assert_eq!(resolver.cached_folders(), 0);
    }

    #[test]
    fn locate_prefers_referencing_folder() {
        let root = tempfile::tempdir().unwrap();
        let top = root.path().join("top");
        let lib = root.path().join("lib");
        std::fs::create_dir_all(&top).unwrap();
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(top.join("Part1.sldprt"), b"").unwrap();
        std::fs::write(lib.join("Part1.sldprt"), b"").unwrap();
        std::fs::write(lib.join("Part2.sldprt"), b"").unwrap();

        let host: Arc<dyn Host> = Arc::new(MemoryHost::new());
        let resolver = DependencyResolver::new(KindResolver::default(), vec![lib.clone()], true);
        let owner = top.join("Assem1.sldasm").to_string_lossy().into_owned();

        let d = resolver.describe(&host, &owner, &HostReference::path("X:\\old\\Part1.sldprt"));
        assert!(d.resolved);
        assert_eq!(PathBuf::from(&d.path), top.join("Part1.sldprt"));
        assert_eq!(d.kind, DocumentKind::Part);

        let d = resolver.describe(&host, &owner, &HostReference::path("X:\\old\\Part2.sldprt"));
        assert_eq!(PathBuf::from(&d.path), lib.join("Part2.sldprt"));
    }

    #[test]
    fn host_search_folders_come_before_configured_ones() {
        let root = tempfile::tempdir().unwrap();
        let host_lib = root.path().join("host");
        let own_lib = root.path().join("own");
        std::fs::create_dir_all(&host_lib).unwrap();
        std::fs::create_dir_all(&own_lib).unwrap();
        std::fs::write(host_lib.join("Part1.sldprt"), b"").unwrap();
        std::fs::write(own_lib.join("Part1.sldprt"), b"").unwrap();

        let memory = Arc::new(MemoryHost::new());
        memory.set_reference_search_folders(vec![host_lib.clone()]);
        let host: Arc<dyn Host> = memory;
        let resolver = DependencyResolver::new(KindResolver::default(), vec![own_lib], true);

        let d = resolver.describe(&host, "", &HostReference::path("Part1.sldprt"));
        assert_eq!(PathBuf::from(&d.path), host_lib.join("Part1.sldprt"));
    }

    #[test]
    fn stored_location_is_probed_last() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("Part9.sldprt"), b"").unwrap();
        let stored = root.path().join("Part9.sldprt").to_string_lossy().into_owned();

        let host: Arc<dyn Host> = Arc::new(MemoryHost::new());
        let resolver = DependencyResolver::new(KindResolver::default(), Vec::new(), false);
        let d = resolver.describe(&host, "/elsewhere/Assem1.sldasm", &HostReference::path(&stored));
        assert!(d.resolved);
        assert_eq!(d.path, stored);
    }

    #[test]
    fn unresolved_keeps_stored_path() {
        let host: Arc<dyn Host> = Arc::new(MemoryHost::new());
        let resolver = DependencyResolver::new(KindResolver::default(), Vec::new(), true);
        let d = resolver.describe(&host, "/nowhere/Assem1.sldasm", &HostReference::path("C:\\gone\\Part4.sldprt"));
        assert!(!d.resolved);
        assert!(!d.is_virtual);
        assert_eq!(d.path, "C:\\gone\\Part4.sldprt");
        assert_eq!(d.parent, "/nowhere/Assem1.sldasm");
    }

    #[test]
    fn virtual_references_are_not_looked_up() {
        let host: Arc<dyn Host> = Arc::new(MemoryHost::new());
        let resolver = DependencyResolver::new(KindResolver::default(), Vec::new(), true);

        let d = resolver.describe(
            &host,
            "/a/Assem1.sldasm",
            &HostReference::virtual_component("Assem3", DocumentKind::Assembly),
        );
        assert!(d.is_virtual && d.resolved);
        assert_eq!(d.path, "/a/Assem3^Assem1.sldasm");
        assert_eq!(d.kind, DocumentKind::Assembly);

        let d = resolver.describe(&host, "/a/Assem1.sldasm", &HostReference::path("/a/Part1^Assem1.sldprt"));
        assert!(d.is_virtual);
        assert_eq!(d.kind, DocumentKind::Part);
        assert_eq!(resolver.cached_folders(), 0);
    }
}
