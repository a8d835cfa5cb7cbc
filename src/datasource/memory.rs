//! In-process datasource. Supports equality, `$and`/`$or`, and the field operators
//! `$eq`, `$ne`, `$in`, `$nin`, `$exists`, `$regex` (+ `$options: "i"`), `$gt`, `$gte`, `$lt`, `$lte`.

use crate::datasource::{Datasource, Filter};
use crate::error::AppError;
use crate::value::{lookup, ObjectId, Value, ID_FIELD, M};
use async_trait::async_trait;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct MemoryDatasource {
    name: String,
    collections: RwLock<HashMap<String, Vec<M>>>,
}

impl MemoryDatasource {
    pub fn new(name: &str) -> Self {
        MemoryDatasource {
            name: name.to_string(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn lock_err() -> AppError {
        AppError::Datasource("memory datasource lock poisoned".into())
    }

    fn select(&self, collection: &str, filter: &Filter) -> Result<Vec<M>, AppError> {
        let guard = self.collections.read().map_err(|_| Self::lock_err())?;
        let docs = match guard.get(collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for doc in docs {
            let keep = match &filter.where_ {
                Some(w) => matches(doc, w)?,
                None => true,
            };
            if keep {
                out.push(doc.clone());
            }
        }
        if let Some(order) = &filter.order {
            let mut parts = order.split_whitespace();
            let field = parts.next().unwrap_or_default().to_string();
            let desc = parts.next().map(|d| d.eq_ignore_ascii_case("desc")).unwrap_or(false);
            out.sort_by(|a, b| {
                let ord = compare(lookup(a, &field), lookup(b, &field));
                if desc {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        let skip = filter.skip.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(out.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl Datasource for MemoryDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<M>, AppError> {
        tracing::debug!(datasource = %self.name, collection, "find_many");
        self.select(collection, filter)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AppError> {
        let unpaged = Filter {
            where_: filter.where_.clone(),
            ..Default::default()
        };
        Ok(self.select(collection, &unpaged)?.len() as u64)
    }

    async fn create(&self, collection: &str, mut data: M) -> Result<M, AppError> {
        tracing::debug!(datasource = %self.name, collection, "create");
        let id = data
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| Value::ObjectId(ObjectId::new()))
            .clone();
        let mut guard = self.collections.write().map_err(|_| Self::lock_err())?;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get(ID_FIELD).map(|v| v.loose_eq(&id)).unwrap_or(false)) {
            return Err(AppError::Datasource(format!(
                "duplicate id {} in {}",
                id.coerce_string(),
                collection
            )));
        }
        docs.push(data.clone());
        Ok(data)
    }

    async fn update_by_id(&self, collection: &str, id: &Value, data: &M) -> Result<Option<M>, AppError> {
        tracing::debug!(datasource = %self.name, collection, "update_by_id");
        let mut guard = self.collections.write().map_err(|_| Self::lock_err())?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(None);
        };
        let Some(doc) = docs
            .iter_mut()
            .find(|d| d.get(ID_FIELD).map(|v| v.loose_eq(id)).unwrap_or(false))
        else {
            return Ok(None);
        };
        for (k, v) in data {
            if k != ID_FIELD {
                doc.insert(k.clone(), v.clone());
            }
        }
        Ok(Some(doc.clone()))
    }

    async fn delete_by_id(&self, collection: &str, id: &Value) -> Result<u64, AppError> {
        tracing::debug!(datasource = %self.name, collection, "delete_by_id");
        let mut guard = self.collections.write().map_err(|_| Self::lock_err())?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !d.get(ID_FIELD).map(|v| v.loose_eq(id)).unwrap_or(false));
        Ok((before - docs.len()) as u64)
    }
}

/// Evaluates a `where` clause against one document.
pub fn matches(doc: &M, where_: &M) -> Result<bool, AppError> {
    for (key, cond) in where_ {
        let ok = match key.as_str() {
            "$or" => {
                let mut any = false;
                for sub in sub_clauses(key, cond)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for sub in sub_clauses(key, cond)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            op if op.starts_with('$') => {
                return Err(AppError::InvalidInput(format!("unsupported operator {}", op)));
            }
            field => field_matches(lookup(doc, field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_clauses<'a>(op: &str, cond: &'a Value) -> Result<Vec<&'a M>, AppError> {
    match cond {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_map()
                    .ok_or_else(|| AppError::InvalidInput(format!("{} expects objects", op)))
            })
            .collect(),
        _ => Err(AppError::InvalidInput(format!("{} expects an array", op))),
    }
}

fn is_operator_map(cond: &Value) -> Option<&M> {
    match cond {
        Value::Map(m) if !m.is_empty() && m.keys().all(|k| k.starts_with('$')) => Some(m),
        _ => None,
    }
}

fn field_matches(actual: Option<&Value>, cond: &Value) -> Result<bool, AppError> {
    let Some(ops) = is_operator_map(cond) else {
        return Ok(equals(actual, cond));
    };
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, arg),
            "$ne" => !equals(actual, arg),
            "$in" => in_list(actual, op, arg)?,
            "$nin" => !in_list(actual, op, arg)?,
            "$exists" => actual.map(|v| !v.is_null()).unwrap_or(false) == arg.coerce_bool(true),
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| AppError::InvalidInput("$regex expects a string".into()))?;
                let insensitive = ops
                    .get("$options")
                    .and_then(Value::as_str)
                    .map(|o| o.contains('i'))
                    .unwrap_or(false);
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(insensitive)
                    .build()
                    .map_err(|e| AppError::InvalidInput(format!("invalid $regex: {}", e)))?;
                actual.and_then(Value::as_str).map(|s| re.is_match(s)).unwrap_or(false)
            }
            "$options" => true,
            "$gt" => compare(actual, Some(arg)) == Ordering::Greater && actual.is_some(),
            "$gte" => compare(actual, Some(arg)) != Ordering::Less && actual.is_some(),
            "$lt" => compare(actual, Some(arg)) == Ordering::Less && actual.is_some(),
            "$lte" => compare(actual, Some(arg)) != Ordering::Greater && actual.is_some(),
            other => return Err(AppError::InvalidInput(format!("unsupported operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(actual: Option<&Value>, op: &str, arg: &Value) -> Result<bool, AppError> {
    match arg {
        Value::Array(items) => Ok(items.iter().any(|item| equals(actual, item))),
        _ => Err(AppError::InvalidInput(format!("{} expects an array", op))),
    }
}

/// Null matches missing fields; array fields match when any element matches.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|v| v.loose_eq(expected))
        }
        Some(v) => v.loose_eq(expected),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::ObjectId(x)), Some(Value::ObjectId(y))) => x.cmp(y),
        (Some(Value::DateTime(x)), Some(Value::DateTime(y))) => x.cmp(y),
        (Some(x @ (Value::Int(_) | Value::Float(_))), Some(y @ (Value::Int(_) | Value::Float(_)))) => x
            .coerce_f64()
            .partial_cmp(&y.coerce_f64())
            .unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::doc;
    use serde_json::json;

    async fn seeded() -> MemoryDatasource {
        let ds = MemoryDatasource::new("mem");
        for (name, age, tags) in [("ann", 31, vec!["a"]), ("bob", 25, vec!["b"]), ("cid", 40, vec!["a", "c"])] {
            ds.create("people", doc(json!({ "name": name, "age": age, "tags": tags })))
                .await
                .unwrap();
        }
        ds
    }

    #[tokio::test]
    async fn create_assigns_ids_and_find_by_id() {
        let ds = seeded().await;
        let all = ds.find_many("people", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 3);
        let id = all[0].get(ID_FIELD).cloned().unwrap();
        assert!(matches!(id, Value::ObjectId(_)));
        let found = ds.find_by_id("people", &id).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("ann")));
    }

    #[tokio::test]
    async fn where_operators() {
        let ds = seeded().await;
        let f = Filter::with_where(doc(json!({ "$or": [{ "name": "ann" }, { "age": { "$gte": 40 } }] })));
        assert_eq!(ds.count("people", &f).await.unwrap(), 2);

        let f = Filter::with_where(doc(json!({ "tags": "a", "age": { "$lt": 35 } })));
        assert_eq!(ds.count("people", &f).await.unwrap(), 1);

        let f = Filter::with_where(doc(json!({ "name": { "$regex": "^BOB$", "$options": "i" } })));
        assert_eq!(ds.count("people", &f).await.unwrap(), 1);

        let f = Filter::with_where(doc(json!({ "name": { "$in": ["ann", "cid"] }, "nick": null })));
        assert_eq!(ds.count("people", &f).await.unwrap(), 2);

        let f = Filter::with_where(doc(json!({ "$where": "1" })));
        assert!(ds.find_many("people", &f).await.is_err());
    }

    #[tokio::test]
    async fn order_skip_limit() {
        let ds = seeded().await;
        let f = Filter {
            order: Some("age DESC".into()),
            skip: Some(1),
            limit: Some(1),
            ..Default::default()
        };
        let rows = ds.find_many("people", &f).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("ann")));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let ds = seeded().await;
        let id = ds.find_many("people", &Filter::new()).await.unwrap()[1]
            .get(ID_FIELD)
            .cloned()
            .unwrap();
        let updated = ds
            .update_by_id("people", &id, &doc(json!({ "age": 26 })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get("age"), Some(&Value::Int(26)));
        assert_eq!(updated.get("name"), Some(&Value::from("bob")));

        let missing = Value::ObjectId(ObjectId::new());
        assert!(ds.update_by_id("people", &missing, &M::new()).await.unwrap().is_none());
        assert_eq!(ds.delete_by_id("people", &id).await.unwrap(), 1);
        assert_eq!(ds.delete_by_id("people", &id).await.unwrap(), 0);
    }
}
