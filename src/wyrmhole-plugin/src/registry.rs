use crate::plugin::{Plugin, PluginError, PluginLoader};
use std::collections::BTreeMap;

type Factory = Box<dyn Fn() -> Result<Box<dyn Plugin>, PluginError> + Send + Sync>;

/// In-process loader backed by a table of factories.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Factory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `mimetype`, replacing any previous one.
    pub fn register<F>(&mut self, mimetype: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        let mimetype = mimetype.into();
        tracing::debug!(%mimetype, "registered plugin factory");
        self.factories.insert(mimetype, Box::new(factory));
        self
    }

    pub fn mimetypes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl PluginLoader for PluginRegistry {
    fn load(&self, mimetype: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let factory = self
            .factories
            .get(mimetype)
            .ok_or_else(|| PluginError::Load {
                mimetype: mimetype.to_string(),
                reason: "no plugin registered for this mimetype".into(),
            })?;
        factory()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("mimetypes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
