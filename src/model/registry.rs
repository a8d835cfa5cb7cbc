//! Model registry. Built once through [`ModelRegistryBuilder`] (register, attach handlers,
//! resolve relations, compile policies) and frozen into a read-only [`ModelRegistry`].

use crate::case::pluralize;
use crate::config::ModelConfig;
use crate::datasource::Datasource;
use crate::error::{AppError, ConfigError};
use crate::model::pipeline::{observer_event, EventHandler};
use crate::model::{relation, Model};
use crate::policy::CompiledPolicy;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A model under construction.
pub struct ModelDraft {
    pub config: ModelConfig,
    pub datasource: Arc<dyn Datasource>,
    plural: String,
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    policy: Option<CompiledPolicy>,
}

impl ModelDraft {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn plural(&self) -> &str {
        &self.plural
    }

    /// Append a handler to `event`.
    pub fn on(&mut self, event: &str, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.handlers.entry(event.to_string()).or_default().push(handler);
        self
    }

    /// Append an observer to a structural hook (`before save`, `after save`).
    pub fn observe(&mut self, hook: &str, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.on(&observer_event(hook), handler)
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn set_policy(&mut self, policy: CompiledPolicy) {
        self.policy = Some(policy);
    }

    fn freeze(self) -> Model {
        Model {
            config: self.config,
            plural: self.plural,
            datasource: self.datasource,
            handlers: self.handlers,
            policy: self.policy,
        }
    }
}

#[derive(Default)]
pub struct ModelRegistryBuilder {
    drafts: Vec<ModelDraft>,
    index: HashMap<String, usize>,
}

impl ModelRegistryBuilder {
    pub fn new() -> Self {
        ModelRegistryBuilder::default()
    }

    /// Register a model. Names and plurals must be unique.
    pub fn register(
        &mut self,
        config: ModelConfig,
        datasource: Arc<dyn Datasource>,
    ) -> Result<&mut ModelDraft, ConfigError> {
        if self.index.contains_key(&config.name) {
            return Err(ConfigError::DuplicateModel(config.name));
        }
        let plural = config.plural.clone().unwrap_or_else(|| pluralize(&config.name));
        if self.drafts.iter().any(|d| d.plural == plural) {
            return Err(ConfigError::DuplicatePlural(plural));
        }
        tracing::debug!(model = %config.name, plural = %plural, datasource = %datasource.name(), "register model");
        let idx = self.drafts.len();
        self.index.insert(config.name.clone(), idx);
        self.drafts.push(ModelDraft {
            config,
            datasource,
            plural,
            handlers: HashMap::new(),
            policy: None,
        });
        Ok(&mut self.drafts[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModelDraft> {
        self.index.get(name).map(|&i| &self.drafts[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModelDraft> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.drafts[i]),
            None => None,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.drafts.iter().map(|d| d.config.name.clone()).collect()
    }

    pub fn drafts(&self) -> impl Iterator<Item = &ModelDraft> {
        self.drafts.iter()
    }

    pub fn drafts_mut(&mut self) -> impl Iterator<Item = &mut ModelDraft> {
        self.drafts.iter_mut()
    }

    /// Fill in derived relation keys. Must run after every model is registered.
    pub fn resolve_relations(&mut self) {
        relation::resolve_relations(self);
    }

    pub fn build(self) -> Arc<ModelRegistry> {
        let mut models = BTreeMap::new();
        let mut plurals = HashMap::new();
        for draft in self.drafts {
            let model = Arc::new(draft.freeze());
            plurals.insert(model.plural().to_string(), model.name().to_string());
            models.insert(model.name().to_string(), model);
        }
        Arc::new(ModelRegistry { models, plurals })
    }
}

/// Read-only after bootstrap; shared by every request.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<Model>>,
    plurals: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    pub fn find(&self, name: &str) -> Result<&Arc<Model>, AppError> {
        self.get(name)
            .ok_or_else(|| AppError::NotFound(format!("model {}", name)))
    }

    pub fn by_plural(&self, plural: &str) -> Option<&Arc<Model>> {
        self.plurals.get(plural).and_then(|name| self.models.get(name))
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaseModel;
    use crate::datasource::MemoryDatasource;
    use crate::model::handler_fn;

    fn ds() -> Arc<dyn Datasource> {
        Arc::new(MemoryDatasource::new("db"))
    }

    #[test]
    fn register_derives_plural_and_rejects_duplicates() {
        let mut b = ModelRegistryBuilder::new();
        assert_eq!(b.register(ModelConfig::new("Category", BaseModel::PersistedModel), ds()).unwrap().plural(), "categories");
        assert!(matches!(
            b.register(ModelConfig::new("Category", BaseModel::PersistedModel), ds()),
            Err(ConfigError::DuplicateModel(_))
        ));
        let mut clash = ModelConfig::new("Kind", BaseModel::PersistedModel);
        clash.plural = Some("categories".into());
        assert!(matches!(b.register(clash, ds()), Err(ConfigError::DuplicatePlural(_))));
    }

    #[test]
    fn build_indexes_by_name_and_plural() {
        let mut b = ModelRegistryBuilder::new();
        b.register(ModelConfig::new("BlogPost", BaseModel::PersistedModel), ds())
            .unwrap()
            .on("ping", handler_fn(|_, _| Ok(())));
        let registry = b.build();
        assert_eq!(registry.len(), 1);
        let model = registry.by_plural("blog-posts").unwrap();
        assert_eq!(model.name(), "BlogPost");
        assert!(model.has_event("ping"));
        assert!(registry.find("Missing").is_err());
    }
}
