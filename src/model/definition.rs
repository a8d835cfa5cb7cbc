//! Frozen model: configuration with resolved relations, its datasource, its compiled
//! policy and the ordered handler lists per event.

use crate::config::{BaseModel, ModelConfig, Relation};
use crate::datasource::Datasource;
use crate::error::AppError;
use crate::model::pipeline::{observer_event, EventHandler};
use crate::model::EventContext;
use crate::policy::CompiledPolicy;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct Model {
    pub(crate) config: ModelConfig,
    pub(crate) plural: String,
    pub(crate) datasource: Arc<dyn Datasource>,
    pub(crate) handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    pub(crate) policy: Option<CompiledPolicy>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.config.name)
            .field("plural", &self.plural)
            .field("datasource", &self.datasource.name())
            .finish()
    }
}

impl Model {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn plural(&self) -> &str {
        &self.plural
    }

    pub fn base(&self) -> BaseModel {
        self.config.base
    }

    pub fn is_public(&self) -> bool {
        self.config.public
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Collection name in the datasource.
    pub fn collection(&self) -> &str {
        &self.config.name
    }

    pub fn datasource(&self) -> &Arc<dyn Datasource> {
        &self.datasource
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.config.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.config.relations.get(name)
    }

    pub fn hidden(&self) -> &[String] {
        &self.config.hidden
    }

    pub fn policy(&self) -> Option<&CompiledPolicy> {
        self.policy.as_ref()
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.handlers.get(event).map(|h| !h.is_empty()).unwrap_or(false)
    }

    /// Run the handlers registered for `event` in registration order. The first error
    /// aborts the chain and is returned unchanged.
    pub async fn trigger(self: &Arc<Self>, event: &str, ctx: &mut EventContext) -> Result<(), AppError> {
        let handlers = match self.handlers.get(event) {
            Some(h) if !h.is_empty() => h,
            _ => return Err(AppError::UnknownEvent(format!("{}.{}", self.name(), event))),
        };
        let previous = ctx.event.replace(event.to_string());
        tracing::debug!(model = %self.name(), event = %event, depth = ctx.depth(), "trigger");
        let mut outcome = Ok(());
        for handler in handlers {
            if let Err(e) = handler.handle(self, ctx).await {
                outcome = Err(e);
                break;
            }
        }
        ctx.event = previous;
        outcome
    }

    /// Run the observers for a structural hook. No observers is not an error; a hook
    /// disabled on `ctx` is skipped.
    pub async fn observe(self: &Arc<Self>, hook: &str, ctx: &mut EventContext) -> Result<(), AppError> {
        if ctx.is_observer_disabled(hook) {
            tracing::debug!(model = %self.name(), hook = %hook, "observer disabled");
            return Ok(());
        }
        let event = observer_event(hook);
        if !self.has_event(&event) {
            return Ok(());
        }
        self.trigger(&event, ctx).await
    }
}
