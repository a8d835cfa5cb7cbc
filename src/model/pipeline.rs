//! Event handlers and the names the built-in pipeline uses.

use crate::error::AppError;
use crate::model::{EventContext, Model};
use async_trait::async_trait;
use std::sync::Arc;

pub const FIND_MANY: &str = "findMany";
pub const FIND_BY_ID: &str = "findById";
pub const FIND_ONE: &str = "findOne";
pub const COUNT: &str = "count";
pub const CREATE: &str = "create";
pub const UPDATE_ATTRIBUTES: &str = "instance_updateAttributes";
pub const DELETE: &str = "instance_delete";
pub const LOGIN: &str = "login";
pub const FIND_SELF: &str = "findSelf";

/// Structural hook every write path runs before storage.
pub const BEFORE_SAVE: &str = "before save";
/// Structural hook every write path runs after the stored record is reloaded.
pub const AFTER_SAVE: &str = "after save";

/// Event name under which observers for `hook` are registered.
pub fn observer_event(hook: &str) -> String {
    format!("__operation__{}", hook.replace(' ', "_"))
}

/// One step of an event chain. Returning an error aborts the chain.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, model: &Arc<Model>, ctx: &mut EventContext) -> Result<(), AppError>;
}

/// Adapter for synchronous closures.
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F> EventHandler for HandlerFn<F>
where
    F: Fn(&Arc<Model>, &mut EventContext) -> Result<(), AppError> + Send + Sync,
{
    async fn handle(&self, model: &Arc<Model>, ctx: &mut EventContext) -> Result<(), AppError> {
        (self.0)(model, ctx)
    }
}

pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Arc<Model>, &mut EventContext) -> Result<(), AppError> + Send + Sync + 'static,
{
    Arc::new(HandlerFn(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_names() {
        assert_eq!(observer_event(BEFORE_SAVE), "__operation__before_save");
        assert_eq!(observer_event(AFTER_SAVE), "__operation__after_save");
    }
}
