//! Chain factory.
//!
//! Maps each chain kind to a constructor and caches the first instance it
//! builds, so every caller of `get(kind)` shares one strategy. Construction
//! happens at most once per kind, even when first accesses race.

use crate::chain::{ChainKind, ChainStrategy, MemoryChain, StatelessChain};
use crate::config::ConversationConfig;
use crate::memory::SessionMemoryStore;
use parley_core::ConfigurationError;
use rootcause::Report;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

type Constructor = dyn Fn() -> Arc<dyn ChainStrategy> + Send + Sync;

struct ChainSlot {
    constructor: Box<Constructor>,
    instance: OnceLock<Arc<dyn ChainStrategy>>,
}

/// Builds and caches chain strategies by kind.
#[derive(Default)]
pub struct ChainFactory {
    slots: RwLock<HashMap<ChainKind, Arc<ChainSlot>>>,
}

impl ChainFactory {
    /// Creates a factory with no kinds registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory with the stateless and memory chains registered.
    #[must_use]
    pub fn with_defaults(config: &ConversationConfig, memory: Arc<SessionMemoryStore>) -> Self {
        let factory = Self::new();
        let stateless_persona = config.stateless_persona.clone();
        let memory_persona = config.memory_persona.clone();

        let slots = [
            (
                ChainKind::Stateless,
                Box::new(move || {
                    Arc::new(StatelessChain::new(stateless_persona.clone()))
                        as Arc<dyn ChainStrategy>
                }) as Box<Constructor>,
            ),
            (
                ChainKind::Memory,
                Box::new(move || {
                    Arc::new(MemoryChain::new(memory_persona.clone(), memory.clone()))
                        as Arc<dyn ChainStrategy>
                }) as Box<Constructor>,
            ),
        ];

        {
            let mut map = factory.write();
            for (kind, constructor) in slots {
                map.insert(
                    kind,
                    Arc::new(ChainSlot {
                        constructor,
                        instance: OnceLock::new(),
                    }),
                );
            }
        }
        factory
    }

    /// Registers a constructor for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChainKind` if the kind is already registered.
    pub fn register<F>(
        &self,
        kind: ChainKind,
        constructor: F,
    ) -> Result<(), Report<ConfigurationError>>
    where
        F: Fn() -> Arc<dyn ChainStrategy> + Send + Sync + 'static,
    {
        let mut map = self.write();
        if map.contains_key(&kind) {
            return Err(ConfigurationError::DuplicateChainKind {
                kind: kind.to_string(),
            }
            .into());
        }

        map.insert(
            kind,
            Arc::new(ChainSlot {
                constructor: Box::new(constructor),
                instance: OnceLock::new(),
            }),
        );
        Ok(())
    }

    /// Returns the shared strategy for `kind`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChainKind` if no constructor is registered.
    pub fn get(
        &self,
        kind: ChainKind,
    ) -> Result<Arc<dyn ChainStrategy>, Report<ConfigurationError>> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownChainKind {
                kind: kind.to_string(),
            })?;

        let instance = slot.instance.get_or_init(|| {
            debug!(%kind, "building chain");
            (slot.constructor)()
        });
        Ok(Arc::clone(instance))
    }

    /// Returns the registered kinds.
    #[must_use]
    pub fn available_kinds(&self) -> Vec<ChainKind> {
        let mut kinds: Vec<_> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        kinds.sort_by_key(ChainKind::as_str);
        kinds
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ChainKind, Arc<ChainSlot>>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ChainFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainFactory")
            .field("kinds", &self.available_kinds())
            .finish()
    }
}
