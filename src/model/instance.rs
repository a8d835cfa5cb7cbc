//! Instance: one live record bound to its model, with tolerant field accessors and
//! explicitly materialized relations.

use crate::error::AppError;
use crate::model::pipeline::{AFTER_SAVE, BEFORE_SAVE};
use crate::model::{EventContext, Model};
use crate::value::{lookup, replace_object_ids, ObjectId, Value, A, ID_FIELD, M};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A materialized relation.
#[derive(Clone, Debug)]
pub enum Related {
    One(Option<Box<Instance>>),
    Many(Vec<Instance>),
}

impl Related {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(Some(inst)) => inst.to_json(),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(items) => serde_json::Value::Array(items.iter().map(Instance::to_json).collect()),
        }
    }
}

/// Borrowed view of a relation value returned by [`Instance::get`].
#[derive(Debug)]
pub enum RelatedRef<'a> {
    One(Option<&'a Instance>),
    Many(&'a [Instance]),
}

/// Accepted shapes for [`Instance::update_attributes`].
#[derive(Debug)]
pub enum UpdateInput {
    Map(M),
    Value(Value),
    Json(serde_json::Value),
    Instance(Box<Instance>),
}

impl UpdateInput {
    /// Normalize to a mapping. Anything that is not a mapping is rejected.
    pub fn into_map(self) -> Result<M, AppError> {
        match self {
            UpdateInput::Map(m) => Ok(m),
            UpdateInput::Value(Value::Map(m)) => Ok(m),
            UpdateInput::Json(json @ serde_json::Value::Object(_)) => {
                Ok(Value::from(json).into_map().unwrap_or_default())
            }
            UpdateInput::Instance(inst) => {
                let mut m = inst.data.clone();
                m.remove(ID_FIELD);
                Ok(m)
            }
            UpdateInput::Value(_) | UpdateInput::Json(_) => Err(AppError::InvalidInput(
                "update attributes expects a mapping".into(),
            )),
        }
    }
}

impl From<M> for UpdateInput {
    fn from(m: M) -> Self {
        UpdateInput::Map(m)
    }
}

impl From<Value> for UpdateInput {
    fn from(v: Value) -> Self {
        UpdateInput::Value(v)
    }
}

impl From<serde_json::Value> for UpdateInput {
    fn from(v: serde_json::Value) -> Self {
        UpdateInput::Json(v)
    }
}

impl From<Instance> for UpdateInput {
    fn from(i: Instance) -> Self {
        UpdateInput::Instance(Box::new(i))
    }
}

#[derive(Clone)]
pub struct Instance {
    model: Arc<Model>,
    id: Value,
    data: M,
    related: BTreeMap<String, Related>,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("id", &self.id)
            .field("data", &self.data)
            .field("related", &self.related)
            .finish()
    }
}

impl Instance {
    /// Wrap a stored document. The identifier is read from [`ID_FIELD`].
    pub fn from_document(model: Arc<Model>, data: M) -> Self {
        let id = data.get(ID_FIELD).cloned().unwrap_or_default();
        let mut inst = Instance {
            model,
            id,
            data,
            related: BTreeMap::new(),
            bytes: Vec::new(),
        };
        inst.refresh_cache();
        inst
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn data(&self) -> &M {
        &self.data
    }

    /// Canonical serialized form, refreshed on every change.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn refresh_cache(&mut self) {
        self.bytes = serde_json::to_vec(&self.to_json()).unwrap_or_default();
    }

    pub(crate) fn set_related(&mut self, name: &str, related: Related) {
        self.related.insert(name.to_string(), related);
        self.refresh_cache();
    }

    /// Fields plus materialized relations. Raw values stored under a relation's name are
    /// left out; a relation that was never materialized is absent.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (k, v) in &self.data {
            if self.model.relation(k).is_none() {
                out.insert(k.clone(), v.to_json());
            }
        }
        for (name, related) in &self.related {
            out.insert(name.clone(), related.to_json());
        }
        serde_json::Value::Object(out)
    }

    /// Deserialize the canonical form into a typed struct.
    pub fn transform<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    /// Materialized value of a relation. For to-many relations an unloaded value reads
    /// as an empty sequence.
    pub fn get(&self, relation: &str) -> Option<RelatedRef<'_>> {
        let kind = self.model.relation(relation)?.kind;
        match self.related.get(relation) {
            Some(Related::One(one)) => Some(RelatedRef::One(one.as_deref())),
            Some(Related::Many(items)) => Some(RelatedRef::Many(items)),
            None if kind.is_many() => Some(RelatedRef::Many(&[])),
            None => None,
        }
    }

    /// # Panics
    /// When `relation` is a to-many relation.
    pub fn get_one(&self, relation: &str) -> Option<&Instance> {
        match self.get(relation) {
            Some(RelatedRef::One(one)) => one,
            Some(RelatedRef::Many(_)) => {
                panic!("{}.{} is a to-many relation", self.model.name(), relation)
            }
            None => None,
        }
    }

    /// # Panics
    /// When `relation` is a to-one relation.
    pub fn get_many(&self, relation: &str) -> &[Instance] {
        match self.get(relation) {
            Some(RelatedRef::Many(items)) => items,
            Some(RelatedRef::One(_)) => {
                panic!("{}.{} is a to-one relation", self.model.name(), relation)
            }
            None => {
                if let Some(rel) = self.model.relation(relation) {
                    if rel.kind.is_single() {
                        panic!("{}.{} is a to-one relation", self.model.name(), relation)
                    }
                }
                &[]
            }
        }
    }

    pub fn get_string(&self, path: &str) -> String {
        lookup(&self.data, path).map(Value::coerce_string).unwrap_or_default()
    }

    pub fn get_f64(&self, path: &str) -> f64 {
        lookup(&self.data, path).map(Value::coerce_f64).unwrap_or(0.0)
    }

    pub fn get_int(&self, path: &str) -> i64 {
        lookup(&self.data, path).map(Value::coerce_i64).unwrap_or(0)
    }

    pub fn get_boolean(&self, path: &str, default: bool) -> bool {
        lookup(&self.data, path)
            .map(|v| v.coerce_bool(default))
            .unwrap_or(default)
    }

    pub fn get_object_id(&self, path: &str) -> ObjectId {
        lookup(&self.data, path)
            .map(Value::coerce_object_id)
            .unwrap_or(ObjectId::NIL)
    }

    pub fn get_m(&self, path: &str) -> Option<M> {
        let value = lookup(&self.data, path)?;
        let out = value.coerce_mapping();
        if out.is_none() && !value.is_null() {
            tracing::warn!(model = %self.model.name(), path = %path, "value is not a mapping");
        }
        out
    }

    pub fn get_a(&self, path: &str) -> Option<A> {
        let value = lookup(&self.data, path)?;
        let out = value.coerce_sequence();
        if out.is_none() && !value.is_null() {
            tracing::warn!(model = %self.model.name(), path = %path, "value is not a sequence");
        }
        out
    }

    /// Remove the model's hidden fields. Shallow: related instances keep theirs.
    pub fn hide_properties(&mut self) {
        for field in self.model.hidden() {
            self.data.remove(field);
        }
        self.refresh_cache();
    }

    /// Re-read all fields from storage. Materialized relations are kept.
    pub async fn reload(&mut self) -> Result<(), AppError> {
        let doc = self
            .model
            .datasource()
            .find_by_id(self.model.collection(), &self.id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("{} {}", self.model.name(), self.id.id_string()))
            })?;
        self.data = doc;
        self.refresh_cache();
        Ok(())
    }

    /// Partial update: normalize the input, run `before save`, persist without relation
    /// fields, reload from storage, hide properties, run `after save`.
    pub async fn update_attributes(
        &mut self,
        input: impl Into<UpdateInput>,
        ctx: &EventContext,
    ) -> Result<(), AppError> {
        let mut data = input.into().into_map()?;
        if !ctx.disable_type_conversions {
            replace_object_ids(&mut data);
        }

        let mut child = ctx.child();
        child.disable_type_conversions = ctx.disable_type_conversions;
        child.disabled_observers = ctx.disabled_observers.clone();
        child.model_id = Some(self.id.clone());
        child.is_new_instance = false;
        child.data = Some(data);
        child.instance = Some(self.clone());
        self.model.observe(BEFORE_SAVE, &mut child).await?;

        let mut data = child.data.take().unwrap_or_default();
        for name in self.model.relations().keys() {
            data.remove(name);
        }
        data.remove(ID_FIELD);

        let stored = self
            .model
            .datasource()
            .update_by_id(self.model.collection(), &self.id, &data)
            .await?;
        if stored.is_none() {
            return Err(AppError::NotFound(format!(
                "{} {}",
                self.model.name(),
                self.id.id_string()
            )));
        }

        self.reload().await?;
        self.hide_properties();

        child.instance = Some(self.clone());
        self.model.observe(AFTER_SAVE, &mut child).await
    }
}

/// Result of a multi-record query.
#[derive(Clone, Debug, Default)]
pub struct InstanceList(Vec<Instance>);

impl InstanceList {
    pub fn new(items: Vec<Instance>) -> Self {
        InstanceList(items)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(Instance::to_json).collect())
    }

    pub fn hide_properties(&mut self) {
        self.0.iter_mut().for_each(Instance::hide_properties);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.0.iter()
    }

    pub fn as_mut_slice(&mut self) -> &mut [Instance] {
        &mut self.0
    }

    pub fn into_vec(self) -> Vec<Instance> {
        self.0
    }
}

impl IntoIterator for InstanceList {
    type Item = Instance;
    type IntoIter = std::vec::IntoIter<Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a InstanceList {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
