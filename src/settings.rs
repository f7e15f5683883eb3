//! Settings infrastructure for hostdocs.
//!
//! This module loads `hostdocs.toml` files, which configure extension-to-kind
//! mapping, which kinds may be pre-created, and where referenced documents are
//! searched for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::document::{DocumentKind, KindResolver, DEFAULT_EXTENSIONS};

/// File name looked up by [`discover_settings`].
pub const SETTINGS_FILE: &str = "hostdocs.toml";

/// Root settings structure loaded from hostdocs.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Reference resolution configuration.
    pub references: Option<ReferenceSettings>,

    /// Document typing configuration.
    pub documents: Option<DocumentSettings>,
}

/// Settings for the dependency resolver.
#[derive(Debug, Default, Deserialize)]
pub struct ReferenceSettings {
    /// Extra folders probed after the host's own search folders.
    /// Relative paths are relative to the settings file.
    #[serde(default)]
    pub search_folders: Vec<PathBuf>,

    /// Whether folder listings are cached across walks (default: true).
    pub cache_folders: Option<bool>,
}

/// Settings for document typing and creation.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentSettings {
    /// Kinds that may be pre-created: ["part", "assembly", "drawing", "unknown"]
    pub creatable: Option<Vec<String>>,

    /// Extensions per kind name. A listed kind replaces its default extensions.
    pub extensions: Option<HashMap<String, Vec<String>>>,
}

impl Settings {
    pub fn cache_folders(&self) -> bool {
        self.references
            .as_ref()
            .and_then(|r| r.cache_folders)
            .unwrap_or(true)
    }
}

/// Load `path`, falling back to defaults when it is missing or malformed.
pub fn load_settings(path: &Path) -> Settings {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read settings");
            return Settings::default();
        }
    };
    toml::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to parse settings");
        Settings::default()
    })
}

/// Find the settings that apply to documents under `start_dir`.
///
/// `start_dir` and its ancestors are tried first, nearest first. Failing
/// that, the immediate subfolders of `start_dir` are tried in name order.
/// Returns the settings with the folder that holds them, used to resolve
/// relative search folders, or defaults with `start_dir`.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    match settings_dirs(start_dir).find(|dir| dir.join(SETTINGS_FILE).is_file()) {
        Some(dir) => {
            debug!(dir = %dir.display(), "using settings");
            (load_settings(&dir.join(SETTINGS_FILE)), dir)
        }
        None => (Settings::default(), start_dir.to_path_buf()),
    }
}

/// Folders that may hold the settings for `start_dir`, in lookup order.
/// Subfolders are only listed once every ancestor has been tried.
fn settings_dirs(start_dir: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    let subfolders = std::iter::once(start_dir).flat_map(|dir| {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
            .map(|entry| entry.path())
            .collect();
        found.sort();
        found
    });
    start_dir.ancestors().map(Path::to_path_buf).chain(subfolders)
}

/// Build the extension table and creatable kinds from settings.
///
/// Unknown kind names are skipped with a warning.
pub fn build_kind_resolver(settings: &Settings) -> KindResolver {
    let mut extensions: HashMap<String, DocumentKind> = DEFAULT_EXTENSIONS
        .iter()
        .map(|(ext, kind)| (ext.to_string(), *kind))
        .collect();
    let mut creatable = DocumentKind::ALL.to_vec();

    let Some(ref documents) = settings.documents else {
        return KindResolver::new(extensions, creatable);
    };

    if let Some(ref configured) = documents.extensions {
        for (name, exts) in configured {
            let Some(kind) = DocumentKind::from_name(name) else {
                warn!(kind = %name, "unknown document kind in extension table");
                continue;
            };
            extensions.retain(|_, k| *k != kind);
            for ext in exts {
                extensions.insert(ext.trim_start_matches('.').to_lowercase(), kind);
            }
        }
    }

    if let Some(ref names) = documents.creatable {
        creatable = names
            .iter()
            .filter_map(|name| {
                let kind = DocumentKind::from_name(name);
                if kind.is_none() {
                    warn!(kind = %name, "unknown creatable document kind");
                }
                kind
            })
            .collect();
    }

    KindResolver::new(extensions, creatable)
}

/// Configured search folders, made absolute against `settings_dir`.
pub fn reference_search_folders(settings: &Settings, settings_dir: &Path) -> Vec<PathBuf> {
    let Some(ref references) = settings.references else {
        return Vec::new();
    };
    references
        .search_folders
        .iter()
        .map(|folder| {
            if folder.is_absolute() {
                folder.clone()
            } else {
                settings_dir.join(folder)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_settings() {
        let settings = Settings::default();
        let kinds = build_kind_resolver(&settings);
        assert_eq!(kinds.resolve("a/Part1.sldprt"), Some(DocumentKind::Part));
        assert_eq!(kinds.resolve("a/Assem1.asmdot"), Some(DocumentKind::Assembly));
        assert!(kinds.is_creatable(DocumentKind::Unknown));
        assert!(settings.cache_folders());
        assert!(reference_search_folders(&settings, Path::new("/w")).is_empty());
    }

    #[test]
    fn configured_extensions_replace_kind_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[documents.extensions]
part = [".IPT", "prt"]
"#,
        )
        .unwrap();
        let kinds = build_kind_resolver(&settings);
        assert_eq!(kinds.resolve("bracket.ipt"), Some(DocumentKind::Part));
        assert_eq!(kinds.resolve("bracket.prt"), Some(DocumentKind::Part));
        assert_eq!(kinds.resolve("bracket.sldprt"), None);
        assert_eq!(kinds.resolve("Assem1.sldasm"), Some(DocumentKind::Assembly));
    }

    #[test]
    fn creatable_kinds_skip_unknown_names() {
        let settings: Settings = toml::from_str(
            r#"
[documents]
creatable = ["part", "sheetmetal", "drawings"]
"#,
        )
        .unwrap();
        let kinds = build_kind_resolver(&settings);
        assert!(kinds.is_creatable(DocumentKind::Part));
        assert!(kinds.is_creatable(DocumentKind::Drawing));
        assert!(!kinds.is_creatable(DocumentKind::Assembly));
        assert!(!kinds.is_creatable(DocumentKind::Unknown));
    }

    #[test]
    fn search_folders_are_relative_to_settings_dir() {
        let settings: Settings = toml::from_str(
            r#"
[references]
search_folders = ["libs", "/shared/parts"]
cache_folders = false
"#,
        )
        .unwrap();
        let folders = reference_search_folders(&settings, Path::new("/work"));
        assert_eq!(
            folders,
            vec![PathBuf::from("/work/libs"), PathBuf::from("/shared/parts")]
        );
        assert!(!settings.cache_folders());
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "[references\nsearch_folders = 3").unwrap();

        let settings = load_settings(&path);
        assert!(settings.references.is_none());
        assert!(settings.documents.is_none());
    }

    #[test]
    fn discover_settings_in_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "[references]\nsearch_folders = [\"libs\"]\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(dir.path());
        assert_eq!(settings_dir, dir.path());
        let references = settings.references.unwrap();
        assert_eq!(references.search_folders, vec![PathBuf::from("libs")]);
    }

    #[test]
    fn discover_settings_in_parent_dir() {
        let parent = tempfile::tempdir().unwrap();
        let child = parent.path().join("subdir");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(
            parent.path().join(SETTINGS_FILE),
            "[documents]\ncreatable = [\"part\"]\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(&child);
        assert_eq!(settings_dir, parent.path());
        assert_eq!(settings.documents.unwrap().creatable.unwrap(), vec!["part"]);
    }

    #[test]
    fn discover_settings_in_child_dir() {
        let parent = tempfile::tempdir().unwrap();
        let child = parent.path().join("config");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(
            child.join(SETTINGS_FILE),
            "[references]\ncache_folders = false\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(parent.path());
        assert_eq!(settings_dir, child);
        assert!(!settings.cache_folders());
    }

    #[test]
    fn child_dirs_are_tried_in_name_order() {
        let parent = tempfile::tempdir().unwrap();
        for (name, kind) in [("b_config", "drawing"), ("a_config", "assembly")] {
            let child = parent.path().join(name);
            std::fs::create_dir_all(&child).unwrap();
            std::fs::write(
                child.join(SETTINGS_FILE),
                format!("[documents]\ncreatable = [\"{kind}\"]\n"),
            )
            .unwrap();
        }

        let (settings, settings_dir) = discover_settings(parent.path());
        assert_eq!(settings_dir, parent.path().join("a_config"));
        assert_eq!(settings.documents.unwrap().creatable.unwrap(), vec!["assembly"]);
    }

    #[test]
    fn discover_settings_parent_preferred_over_child() {
        let parent = tempfile::tempdir().unwrap();
        let child = parent.path().join("nested");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(
            parent.path().join(SETTINGS_FILE),
            "[documents]\ncreatable = [\"part\"]\n",
        )
        .unwrap();
        std::fs::write(
            child.join(SETTINGS_FILE),
            "[documents]\ncreatable = [\"drawing\"]\n",
        )
        .unwrap();

        let (settings, settings_dir) = discover_settings(parent.path());
        assert_eq!(settings_dir, parent.path());
        assert_eq!(settings.documents.unwrap().creatable.unwrap(), vec!["part"]);
    }
}
