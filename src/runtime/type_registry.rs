//! Registry of item types that can flow through flowgraph channels
//!
//! Ports are type-erased, so the pipeline looks up how to build a channel
//! and wrap its senders by `TypeId` at build time.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Sender as CrossbeamSender, bounded};

use super::sender::{ChannelMessage, Sender};

type ErasedEnd = Box<dyn Any + Send>;
type ChannelCreatorFn = Box<dyn Fn(usize) -> (ErasedEnd, ErasedEnd) + Send + Sync>;
type OutputWrapperFn = Box<dyn Fn(Vec<ErasedEnd>) -> Result<ErasedEnd, String> + Send + Sync>;

struct Entry {
    create: ChannelCreatorFn,
    wrap: OutputWrapperFn,
}

pub(crate) struct TypeRegistry {
    entries: HashMap<TypeId, Entry>,
}

impl TypeRegistry {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn register<T: 'static + Send + Clone>(&mut self) {
        let create: ChannelCreatorFn = Box::new(|capacity: usize| {
            let (tx, rx) = bounded::<ChannelMessage<T>>(capacity);
            (Box::new(tx) as ErasedEnd, Box::new(rx) as ErasedEnd)
        });

        // Fan-out: all senders of one output port become a single broadcast Sender<T>
        let wrap: OutputWrapperFn = Box::new(|senders: Vec<ErasedEnd>| {
            if senders.is_empty() {
                return Err("no senders to wrap".to_string());
            }
            let typed = senders
                .into_iter()
                .map(|s| {
                    s.downcast::<CrossbeamSender<ChannelMessage<T>>>()
                        .map(|tx| *tx)
                        .map_err(|_| format!("sender is not a channel of {}", std::any::type_name::<T>()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(Sender::new(typed)) as ErasedEnd)
        });

        self.entries.insert(TypeId::of::<T>(), Entry { create, wrap });
    }

    pub(crate) fn is_registered(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    pub(crate) fn create_channel(&self, type_id: TypeId, capacity: usize) -> Option<(ErasedEnd, ErasedEnd)> {
        self.entries.get(&type_id).map(|e| (e.create)(capacity))
    }

    pub(crate) fn wrap_output(&self, type_id: TypeId, senders: Vec<ErasedEnd>) -> Result<ErasedEnd, String> {
        let entry = self
            .entries
            .get(&type_id)
            .ok_or_else(|| format!("type {:?} not registered", type_id))?;
        (entry.wrap)(senders)
    }
}

lazy_static::lazy_static! {
    pub(crate) static ref TYPE_REGISTRY: Arc<Mutex<TypeRegistry>> = {
        let mut registry = TypeRegistry::new();
        registry.register::<u8>();
        Arc::new(Mutex::new(registry))
    };
}

/// Register a custom item type for use in pipelines.
/// Call this before building pipelines whose ports carry `T`.
pub fn register_type<T: 'static + Send + Clone>() {
    match TYPE_REGISTRY.lock() {
        Ok(mut registry) => registry.register::<T>(),
        Err(poisoned) => poisoned.into_inner().register::<T>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Marker;

    #[test]
    fn test_bytes_registered_by_default() {
        let registry = TYPE_REGISTRY.lock().unwrap();
        assert!(registry.is_registered(TypeId::of::<u8>()));
        assert!(registry.create_channel(TypeId::of::<u8>(), 4).is_some());
    }

    #[test]
    fn test_register_custom_type() {
        register_type::<Marker>();
        let registry = TYPE_REGISTRY.lock().unwrap();
        assert!(registry.is_registered(TypeId::of::<Marker>()));
    }

    #[test]
    fn test_wrap_output_rejects_wrong_sender_type() {
        register_type::<Marker>();
        let registry = TYPE_REGISTRY.lock().unwrap();
        let (tx, _rx) = registry.create_channel(TypeId::of::<Marker>(), 4).unwrap();
        assert!(registry.wrap_output(TypeId::of::<u8>(), vec![tx]).is_err());
        assert!(registry.wrap_output(TypeId::of::<u8>(), Vec::new()).is_err());
    }
}
