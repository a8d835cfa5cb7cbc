//! Built-in CRUD handlers. They are ordinary handlers registered under the CRUD event
//! names; results are hidden-property scrubbed before serialization.

use crate::error::AppError;
use crate::model::pipeline::{
    COUNT, CREATE, DELETE, FIND_BY_ID, FIND_MANY, FIND_ONE, FIND_SELF, UPDATE_ATTRIBUTES,
};
use crate::model::{EventContext, EventHandler, Model, ModelDraft, UpdateInput};
use crate::value::Value;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crud {
    FindMany,
    FindById,
    FindOne,
    Count,
    Create,
    UpdateAttributes,
    Delete,
    FindSelf,
}

impl Crud {
    pub const ALL: [Crud; 7] = [
        Crud::FindMany,
        Crud::FindById,
        Crud::FindOne,
        Crud::Count,
        Crud::Create,
        Crud::UpdateAttributes,
        Crud::Delete,
    ];

    pub fn event(self) -> &'static str {
        match self {
            Crud::FindMany => FIND_MANY,
            Crud::FindById => FIND_BY_ID,
            Crud::FindOne => FIND_ONE,
            Crud::Count => COUNT,
            Crud::Create => CREATE,
            Crud::UpdateAttributes => UPDATE_ATTRIBUTES,
            Crud::Delete => DELETE,
            Crud::FindSelf => FIND_SELF,
        }
    }
}

/// Register every CRUD handler on `draft`.
pub fn register_crud(draft: &mut ModelDraft) {
    for op in Crud::ALL {
        draft.on(op.event(), Arc::new(op));
    }
}

fn require_id(ctx: &EventContext) -> Result<Value, AppError> {
    ctx.model_id
        .clone()
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::BadRequest("missing id".into()))
}

fn not_found(model: &Model, id: &Value) -> AppError {
    AppError::NotFound(format!("{} {}", model.name(), id.id_string()))
}

#[async_trait]
impl EventHandler for Crud {
    async fn handle(&self, model: &Arc<Model>, ctx: &mut EventContext) -> Result<(), AppError> {
        let result = match self {
            Crud::FindMany => {
                let filter = ctx.filter.clone().unwrap_or_default();
                let mut list = model.find_many(&filter, ctx).await?;
                list.hide_properties();
                list.to_json()
            }
            Crud::FindById => {
                let id = require_id(ctx)?;
                let mut inst = model
                    .find_by_id(&id, ctx.filter.as_ref(), ctx)
                    .await?
                    .ok_or_else(|| not_found(model, &id))?;
                inst.hide_properties();
                inst.to_json()
            }
            Crud::FindOne => {
                let filter = ctx.filter.clone().unwrap_or_default();
                let mut inst = model
                    .find_one(&filter, ctx)
                    .await?
                    .ok_or_else(|| AppError::NotFound(model.name().to_string()))?;
                inst.hide_properties();
                inst.to_json()
            }
            Crud::Count => {
                let where_ = ctx.filter.as_ref().and_then(|f| f.where_.clone());
                json!({ "count": model.count(where_, ctx).await? })
            }
            Crud::Create => {
                let data = ctx
                    .data
                    .take()
                    .ok_or_else(|| AppError::BadRequest("missing body".into()))?;
                let mut inst = model.create(data, ctx).await?;
                inst.hide_properties();
                let out = inst.to_json();
                ctx.model_id = Some(inst.id().clone());
                ctx.instance = Some(inst);
                out
            }
            Crud::UpdateAttributes => {
                let data = ctx
                    .data
                    .take()
                    .ok_or_else(|| AppError::BadRequest("missing body".into()))?;
                let mut inst = match ctx.instance.take() {
                    Some(inst) => inst,
                    None => {
                        let id = require_id(ctx)?;
                        model
                            .find_by_id(&id, None, ctx)
                            .await?
                            .ok_or_else(|| not_found(model, &id))?
                    }
                };
                inst.update_attributes(UpdateInput::Map(data), ctx).await?;
                let out = inst.to_json();
                ctx.instance = Some(inst);
                out
            }
            Crud::Delete => {
                let id = require_id(ctx)?;
                let count = model.delete_by_id(&id, ctx).await?;
                if count != 1 {
                    return Err(AppError::DeletedCount {
                        id: id.id_string(),
                        count,
                    });
                }
                ctx.result = None;
                ctx.status_code = StatusCode::NO_CONTENT;
                return Ok(());
            }
            Crud::FindSelf => {
                let user_id = ctx
                    .bearer
                    .user_id()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Unauthorized("no bearer".into()))?;
                let id = Value::from(user_id);
                let mut inst = model
                    .find_by_id(&id, ctx.filter.as_ref(), ctx)
                    .await?
                    .ok_or_else(|| not_found(model, &id))?;
                inst.hide_properties();
                inst.to_json()
            }
        };
        ctx.result = Some(result);
        ctx.status_code = StatusCode::OK;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseModel, ModelConfig};
    use crate::datasource::MemoryDatasource;
    use crate::model::{ModelRegistry, ModelRegistryBuilder};
    use crate::value::doc;

    fn registry() -> Arc<ModelRegistry> {
        let mut b = ModelRegistryBuilder::new();
        let draft = b
            .register(
                ModelConfig::new("Note", BaseModel::PersistedModel).with_hidden(&["secret"]),
                Arc::new(MemoryDatasource::new("db")),
            )
            .unwrap();
        register_crud(draft);
        b.build()
    }

    #[tokio::test]
    async fn delete_answers_no_content_then_deleted_count() {
        let registry = registry();
        let note = registry.get("Note").unwrap().clone();
        let root = EventContext::new(registry.clone());
        let created = note.create(doc(json!({ "title": "a" })), &root).await.unwrap();

        let mut ctx = EventContext::new(registry.clone()).with_model_id(created.id().clone());
        note.trigger(DELETE, &mut ctx).await.unwrap();
        assert_eq!(ctx.status_code, StatusCode::NO_CONTENT);
        assert!(ctx.result.is_none());

        let mut again = EventContext::new(registry).with_model_id(created.id().clone());
        let err = note.trigger(DELETE, &mut again).await.unwrap_err();
        assert!(matches!(err, AppError::DeletedCount { count: 0, .. }));
    }

    #[tokio::test]
    async fn results_are_scrubbed_of_hidden_fields() {
        let registry = registry();
        let note = registry.get("Note").unwrap().clone();
        let mut ctx = EventContext::new(registry.clone())
            .with_data(doc(json!({ "title": "a", "secret": "s" })));
        note.trigger(CREATE, &mut ctx).await.unwrap();
        let body = ctx.result.unwrap();
        assert_eq!(body["title"], "a");
        assert!(body.get("secret").is_none());

        let mut count = EventContext::new(registry);
        note.trigger(COUNT, &mut count).await.unwrap();
        assert_eq!(count.result.unwrap(), json!({ "count": 1 }));
    }
}
