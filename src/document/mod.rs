//! Document wrappers and their supporting types.
//!
//! This module provides:
//! - `DocumentKind` and `KindResolver` for extension-based typing
//! - `Document` and `DocumentState` for the per-document lifecycle
//! - `DocumentHandler` for behaviour attached to every registered document

mod handlers;
mod kind;
mod state;

pub(crate) use handlers::DocumentHandlers;
pub use handlers::DocumentHandler;
pub use kind::{DocumentKind, KindResolver, DEFAULT_EXTENSIONS};
pub use state::{CloseReason, ClosingEvent, Document, DocumentState};
