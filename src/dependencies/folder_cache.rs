use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

type Listing = Arc<HashMap<String, PathBuf>>;

/// Case-insensitive file listings, one per folder.
///
/// Listings are shared by every walk until [`FolderCache::clear`] is called.
/// With caching disabled each probe lists the folder again.
#[derive(Debug)]
pub struct FolderCache {
    enabled: bool,
    folders: DashMap<PathBuf, Listing>,
}

impl FolderCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            folders: DashMap::new(),
        }
    }

    /// Full path of `file_name` inside `folder`, ignoring case.
    pub fn find(&self, folder: &Path, file_name: &str) -> Option<PathBuf> {
        self.listing(folder).get(&file_name.to_lowercase()).cloned()
    }

    pub fn clear(&self) {
        self.folders.clear();
    }

    /// Number of cached folders.
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    fn listing(&self, folder: &Path) -> Listing {
        if self.enabled {
            if let Some(listing) = self.folders.get(folder) {
                return Arc::clone(listing.value());
            }
        }
        let listing = Arc::new(list_folder(folder));
        if self.enabled {
            self.folders
                .insert(folder.to_path_buf(), Arc::clone(&listing));
        }
        listing
    }
}

fn list_folder(folder: &Path) -> HashMap<String, PathBuf> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(folder = %folder.display(), error = %e, "cannot list folder");
            return HashMap::new();
        }
    };
    entries
        .flatten()
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            (name, entry.path())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_files_ignoring_case() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Part1.SLDPRT"), b"").unwrap();
        std::fs::create_dir(dir.path().join("Part2.sldprt")).unwrap();

        let cache = FolderCache::new(true);
        assert_eq!(
            cache.find(dir.path(), "part1.sldprt"),
            Some(dir.path().join("Part1.SLDPRT"))
        );
        assert_eq!(cache.find(dir.path(), "Part2.sldprt"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cached_listing_survives_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FolderCache::new(true);
        assert_eq!(cache.find(dir.path(), "late.sldprt"), None);

        std::fs::write(dir.path().join("late.sldprt"), b"").unwrap();
        assert_eq!(cache.find(dir.path(), "late.sldprt"), None);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.find(dir.path(), "late.sldprt").is_some());
    }

    #[test]
    fn disabled_cache_lists_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FolderCache::new(false);
        assert_eq!(cache.find(dir.path(), "late.sldprt"), None);

        std::fs::write(dir.path().join("late.sldprt"), b"").unwrap();
        assert!(cache.find(dir.path(), "late.sldprt").is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_folder_is_empty() {
        let cache = FolderCache::new(true);
        assert_eq!(cache.find(Path::new("/no/such/folder"), "x.sldprt"), None);
    }
}
