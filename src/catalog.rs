//! Registry of rule modules by game id.

use boardroom_game::GameModule;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Rule modules available to create or load tables, keyed by [`GameModule::id`].
#[derive(Debug)]
pub struct ModuleCatalog<M: GameModule> {
    modules: HashMap<String, Arc<M>>,
}

impl<M: GameModule> Clone for ModuleCatalog<M> {
    fn clone(&self) -> Self {
        Self {
            modules: self.modules.clone(),
        }
    }
}

impl<M: GameModule> Default for ModuleCatalog<M> {
    fn default() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }
}

impl<M: GameModule> ModuleCatalog<M> {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding a single module.
    pub fn with(module: M) -> Self {
        let mut catalog = Self::new();
        catalog.register(module);
        catalog
    }

    /// Adds `module`, replacing any module with the same id.
    #[instrument(skip(self, module), fields(game = module.id()))]
    pub fn register(&mut self, module: M) -> Arc<M> {
        let module = Arc::new(module);
        debug!("Module registered");
        self.modules
            .insert(module.id().to_string(), Arc::clone(&module));
        module
    }

    /// Module for `game_id`.
    pub fn get(&self, game_id: &str) -> Option<Arc<M>> {
        self.modules.get(game_id).cloned()
    }

    /// Registered game ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}
