//! Document registry and lifecycle coordination for CAD host applications.
//!
//! A [`Registry`] mirrors the set of documents a [`Host`] has open. Host load
//! notifications flow through the [`Dispatcher`], which builds [`Document`]
//! wrappers; the registry admits each document once, tracks activation,
//! and removes documents when the host destroys them or silently invalidates
//! their handles. Dependency walks resolve the files a document references
//! without opening any of them.
//!
//! ```
//! use std::sync::Arc;
//! use hostdocs::{DocumentKind, MemoryHost, Registry};
//!
//! let host = Arc::new(MemoryHost::new());
//! host.add_file("C:\\parts\\Bracket.sldprt", DocumentKind::Part);
//!
//! let registry = Registry::new(host.clone());
//! registry.attach();
//!
//! let doc = registry.pre_create_from_path("C:\\parts\\Bracket.sldprt").unwrap();
//! registry.commit(&doc).unwrap();
//! assert_eq!(registry.count(), 1);
//! assert!(doc.is_committed());
//! ```

pub mod dependencies;
mod dispatch;
pub mod document;
mod error;
pub mod host;
mod identity;
pub(crate) mod paths;
mod registry;
pub mod settings;
mod signal;

pub use dependencies::{Dependencies, DependencyDescriptor};
pub use dispatch::Dispatcher;
pub use document::{
    CloseReason, ClosingEvent, Document, DocumentHandler, DocumentKind, DocumentState,
    KindResolver,
};
pub use error::{HostOperation, ListenerError, RegistryError, Result};
pub use host::{
    DocumentHandle, Host, HostCode, HostReference, MemoryHost, OpaqueId, OpenOptions,
    ReferenceTarget, SubscriptionId,
};
pub use identity::IdentityComparer;
pub use registry::Registry;
pub use settings::{discover_settings, load_settings, Settings};
pub use signal::{ListenerId, Signal};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn registry_from_discovered_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(settings::SETTINGS_FILE),
            "[documents]\ncreatable = [\"part\"]\n\n[documents.extensions]\npart = [\"ipt\"]\n",
        )
        .unwrap();
        let (settings, settings_dir) = discover_settings(dir.path());

        let host = Arc::new(MemoryHost::new());
        let registry = Registry::with_settings(host, &settings, &settings_dir);
        assert!(registry.pre_create_from_path("/x/bracket.ipt").is_ok());
        assert!(matches!(
            registry.pre_create(DocumentKind::Assembly),
            Err(RegistryError::UnsupportedKind(_))
        ));
        assert!(matches!(
            registry.pre_create_from_path("/x/bracket.sldprt"),
            Err(RegistryError::UnsupportedKind(_))
        ));
    }
}
