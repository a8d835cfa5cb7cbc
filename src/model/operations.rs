//! Storage-backed operations on a model. Handlers call these; they do not dispatch events
//! themselves apart from the structural save hooks on `create`.

use crate::datasource::Filter;
use crate::error::AppError;
use crate::model::pipeline::{AFTER_SAVE, BEFORE_SAVE};
use crate::model::relation::include_relations;
use crate::model::{EventContext, Instance, InstanceList, Model};
use crate::value::{replace_object_ids, ObjectId, Value, ID_FIELD, M};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl Model {
    fn prepare_filter(&self, filter: &Filter, ctx: &EventContext) -> Filter {
        let mut filter = filter.clone();
        if !ctx.disable_type_conversions {
            if let Some(w) = filter.where_.as_mut() {
                replace_object_ids(w);
            }
        }
        filter
    }

    fn prepare_id(&self, id: &Value, ctx: &EventContext) -> Value {
        match id {
            Value::String(s) if !ctx.disable_type_conversions => ObjectId::parse_str(s)
                .map(Value::ObjectId)
                .unwrap_or_else(|_| id.clone()),
            _ => id.clone(),
        }
    }

    /// Query records and materialize `filter.include`. Boxed because include traversal
    /// recurses into related models.
    pub fn find_many<'a>(
        self: &'a Arc<Self>,
        filter: &'a Filter,
        ctx: &'a EventContext,
    ) -> BoxFuture<'a, Result<InstanceList, AppError>> {
        Box::pin(async move {
            let filter = self.prepare_filter(filter, ctx);
            tracing::debug!(model = %self.name(), filter = ?filter.where_, "find many");
            let docs = self.datasource.find_many(self.collection(), &filter).await?;
            let mut list = InstanceList::new(
                docs.into_iter()
                    .map(|d| Instance::from_document(self.clone(), d))
                    .collect(),
            );
            if !filter.include.is_empty() {
                include_relations(self, list.as_mut_slice(), &filter.include, ctx).await?;
            }
            Ok(list)
        })
    }

    pub async fn find_one(self: &Arc<Self>, filter: &Filter, ctx: &EventContext) -> Result<Option<Instance>, AppError> {
        let mut filter = filter.clone();
        filter.limit = Some(1);
        Ok(self.find_many(&filter, ctx).await?.into_iter().next())
    }

    pub async fn find_by_id(
        self: &Arc<Self>,
        id: &Value,
        filter: Option<&Filter>,
        ctx: &EventContext,
    ) -> Result<Option<Instance>, AppError> {
        let id = self.prepare_id(id, ctx);
        let mut by_id = M::new();
        by_id.insert(ID_FIELD.to_string(), id);
        let filter = match filter {
            Some(f) => Filter {
                include: f.include.clone(),
                ..Filter::with_where(by_id)
            },
            None => Filter::with_where(by_id),
        };
        self.find_one(&filter, ctx).await
    }

    pub async fn count(self: &Arc<Self>, where_: Option<M>, ctx: &EventContext) -> Result<u64, AppError> {
        let filter = self.prepare_filter(
            &Filter {
                where_,
                ..Filter::default()
            },
            ctx,
        );
        self.datasource.count(self.collection(), &filter).await
    }

    /// Insert a record: `before save` (with `is_new_instance`), relation fields stripped,
    /// storage create, `after save`.
    pub async fn create(self: &Arc<Self>, data: M, ctx: &EventContext) -> Result<Instance, AppError> {
        let mut data = data;
        if !ctx.disable_type_conversions {
            replace_object_ids(&mut data);
        }
        let mut child = ctx.child().with_type_conversions_of(ctx);
        child.disabled_observers = ctx.disabled_observers.clone();
        child.is_new_instance = true;
        child.data = Some(data);
        self.observe(BEFORE_SAVE, &mut child).await?;

        let mut data = child.data.take().unwrap_or_default();
        for name in self.relations().keys() {
            data.remove(name);
        }
        let doc = self.datasource.create(self.collection(), data).await?;
        let instance = Instance::from_document(self.clone(), doc);
        tracing::debug!(model = %self.name(), id = %instance.id().id_string(), "created");

        child.model_id = Some(instance.id().clone());
        child.instance = Some(instance.clone());
        self.observe(AFTER_SAVE, &mut child).await?;
        Ok(instance)
    }

    /// Returns the number of deleted records.
    pub async fn delete_by_id(self: &Arc<Self>, id: &Value, ctx: &EventContext) -> Result<u64, AppError> {
        let id = self.prepare_id(id, ctx);
        self.datasource.delete_by_id(self.collection(), &id).await
    }
}

impl EventContext {
    pub(crate) fn with_type_conversions_of(mut self, other: &EventContext) -> Self {
        self.disable_type_conversions = other.disable_type_conversions;
        self
    }
}
