//! Document kinds and extension-based kind resolution.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::paths;

/// The kind of model a document holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Part,
    Assembly,
    Drawing,
    /// Not (yet) typed, e.g. a foreign format the host has not converted.
    Unknown,
}

/// Native extensions recognised without any configuration.
pub static DEFAULT_EXTENSIONS: LazyLock<HashMap<&'static str, DocumentKind>> =
    LazyLock::new(|| {
        let mut m = HashMap::new();
        for ext in ["sldprt", "sldblk", "prtdot", "sldlfp", "prt"] {
            m.insert(ext, DocumentKind::Part);
        }
        for ext in ["sldasm", "asmdot", "asm"] {
            m.insert(ext, DocumentKind::Assembly);
        }
        for ext in ["slddrw", "drwdot", "drw"] {
            m.insert(ext, DocumentKind::Drawing);
        }
        m
    });

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Part,
        DocumentKind::Assembly,
        DocumentKind::Drawing,
        DocumentKind::Unknown,
    ];

    /// Kind for `path` using the default extension table.
    pub fn from_extension(path: &str) -> Self {
        paths::extension(path)
            .and_then(|ext| DEFAULT_EXTENSIONS.get(ext.to_lowercase().as_str()).copied())
            .unwrap_or(DocumentKind::Unknown)
    }

    /// Parse a configuration name ("part", "assembly", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "part" | "parts" => Some(DocumentKind::Part),
            "assembly" | "assemblies" => Some(DocumentKind::Assembly),
            "drawing" | "drawings" => Some(DocumentKind::Drawing),
            "unknown" => Some(DocumentKind::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Part => "part",
            DocumentKind::Assembly => "assembly",
            DocumentKind::Drawing => "drawing",
            DocumentKind::Unknown => "unknown",
        }
    }

    pub fn is_specific(&self) -> bool {
        *self != DocumentKind::Unknown
    }

    /// Extension used when synthesising a file name for this kind.
    pub fn native_extension(&self) -> Option<&'static str> {
        match self {
            DocumentKind::Part => Some("sldprt"),
            DocumentKind::Assembly => Some("sldasm"),
            DocumentKind::Drawing => Some("slddrw"),
            DocumentKind::Unknown => None,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps file extensions to kinds and decides which kinds may be pre-created.
#[derive(Debug, Clone)]
pub struct KindResolver {
    extensions: HashMap<String, DocumentKind>,
    creatable: Vec<DocumentKind>,
}

impl Default for KindResolver {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS
                .iter()
                .map(|(ext, kind)| (ext.to_string(), *kind))
                .collect(),
            creatable: DocumentKind::ALL.to_vec(),
        }
    }
}

impl KindResolver {
    /// Build a resolver with an explicit extension table.
    pub fn new(extensions: HashMap<String, DocumentKind>, creatable: Vec<DocumentKind>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|(ext, kind)| (ext.trim_start_matches('.').to_lowercase(), kind))
            .collect();
        Self {
            extensions,
            creatable,
        }
    }

    /// Kind for `path`, or `None` when the extension is not recognised.
    pub fn resolve(&self, path: &str) -> Option<DocumentKind> {
        let ext = paths::extension(path)?;
        self.extensions.get(&ext.to_lowercase()).copied()
    }

    pub fn is_creatable(&self, kind: DocumentKind) -> bool {
        self.creatable.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extensions() {
        assert_eq!(DocumentKind::from_extension("C:\\a\\Part1.prt"), DocumentKind::Part);
        assert_eq!(DocumentKind::from_extension("Part1.SLDPRT"), DocumentKind::Part);
        assert_eq!(DocumentKind::from_extension("Assem1.sldasm"), DocumentKind::Assembly);
        assert_eq!(DocumentKind::from_extension("Draw1.DRWDOT"), DocumentKind::Drawing);
        assert_eq!(DocumentKind::from_extension("foreign.IGS"), DocumentKind::Unknown);
        assert_eq!(DocumentKind::from_extension("Part1"), DocumentKind::Unknown);
    }

    #[test]
    fn resolver_uses_custom_table() {
        let resolver = KindResolver::new(
            [(".IPT".to_string(), DocumentKind::Part)].into_iter().collect(),
            vec![DocumentKind::Part],
        );
        assert_eq!(resolver.resolve("/x/bracket.ipt"), Some(DocumentKind::Part));
        assert_eq!(resolver.resolve("/x/bracket.sldprt"), None);
        assert!(resolver.is_creatable(DocumentKind::Part));
        assert!(!resolver.is_creatable(DocumentKind::Drawing));
    }

    #[test]
    fn kind_names() {
        assert_eq!(DocumentKind::from_name("Assembly"), Some(DocumentKind::Assembly));
        assert_eq!(DocumentKind::from_name(" drawings "), Some(DocumentKind::Drawing));
        assert_eq!(DocumentKind::from_name("sheetmetal"), None);
        assert_eq!(DocumentKind::Part.to_string(), "part");
    }
}
