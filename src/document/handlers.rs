//! Per-document handlers.
//!
//! A handler type is registered once with a factory. Every admitted document
//! gets its own instance, initialised on admission and released on removal.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::state::Document;

/// Behaviour attached to each registered document.
pub trait DocumentHandler: Send + Sync + 'static {
    fn init(&self, _document: &Arc<Document>) {}

    fn release(&self, _document: &Arc<Document>) {}
}

type AnyHandler = Arc<dyn Any + Send + Sync>;
type HandlerFactory = Arc<dyn Fn() -> (Arc<dyn DocumentHandler>, AnyHandler) + Send + Sync>;

struct Instance {
    type_id: TypeId,
    handler: Arc<dyn DocumentHandler>,
    any: AnyHandler,
}

#[derive(Default)]
pub(crate) struct DocumentHandlers {
    factories: Mutex<Vec<(TypeId, HandlerFactory)>>,
    instances: Mutex<HashMap<usize, Vec<Instance>>>,
}

fn key(document: &Arc<Document>) -> usize {
    Arc::as_ptr(document) as usize
}

impl DocumentHandlers {
    /// Returns `false` when a handler of this type is already registered.
    pub(crate) fn register<H, F>(&self, factory: F) -> bool
    where
        H: DocumentHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<H>();
        let mut factories = self.factories.lock();
        if factories.iter().any(|(id, _)| *id == type_id) {
            warn!(
                handler = std::any::type_name::<H>(),
                "handler already registered"
            );
            return false;
        }
        factories.push((
            type_id,
            Arc::new(move || {
                let handler = Arc::new(factory());
                (
                    Arc::clone(&handler) as Arc<dyn DocumentHandler>,
                    handler as AnyHandler,
                )
            }),
        ));
        true
    }

    /// Create and initialise every registered handler missing for `document`.
    pub(crate) fn init(&self, document: &Arc<Document>) {
        let factories: Vec<_> = self.factories.lock().clone();
        let mut created = Vec::new();
        {
            let mut instances = self.instances.lock();
            let entry = instances.entry(key(document)).or_default();
            for (type_id, factory) in factories {
                if entry.iter().any(|i| i.type_id == type_id) {
                    continue;
                }
                let (handler, any) = factory();
                created.push(Arc::clone(&handler));
                entry.push(Instance {
                    type_id,
                    handler,
                    any,
                });
            }
        }
        for handler in created {
            handler.init(document);
        }
    }

    pub(crate) fn release(&self, document: &Arc<Document>) {
        let removed = self.instances.lock().remove(&key(document));
        for instance in removed.into_iter().flatten() {
            instance.handler.release(document);
        }
    }

    pub(crate) fn get<H: DocumentHandler>(&self, document: &Arc<Document>) -> Option<Arc<H>> {
        let instances = self.instances.lock();
        instances
            .get(&key(document))?
            .iter()
            .find(|i| i.type_id == TypeId::of::<H>())
            .and_then(|i| Arc::clone(&i.any).downcast::<H>().ok())
    }
}
