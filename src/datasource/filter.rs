//! Query filter handed to datasources. `where` is opaque to the runtime: it is passed
//! through to the connector after id normalization.

use crate::value::{Value, M};
use serde::{Deserialize, Serialize};

/// Relation to materialize, with an optional filter applied to the related records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeItem {
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Box<Filter>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_: Option<M>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<IncludeItem>,
    /// `"field ASC"` or `"field DESC"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn with_where(where_: M) -> Self {
        Filter {
            where_: Some(where_),
            ..Default::default()
        }
    }

    /// Adds an equality condition to the `where` clause.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_
            .get_or_insert_with(M::new)
            .insert(field.into(), value.into());
        self
    }

    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(IncludeItem {
            relation: relation.into(),
            scope: None,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Combines this filter's `where` with `extra` under `$and`, keeping the other options.
    pub fn and_where(mut self, extra: M) -> Self {
        self.where_ = Some(match self.where_.take() {
            Some(existing) if !existing.is_empty() => {
                let mut and = M::new();
                and.insert(
                    "$and".into(),
                    Value::Array(vec![Value::Map(existing), Value::Map(extra)]),
                );
                and
            }
            _ => extra,
        });
        self
    }

    /// Parses the `filter` query parameter (JSON).
    pub fn from_query(raw: &str) -> Result<Self, crate::error::AppError> {
        serde_json::from_str(raw)
            .map_err(|e| crate::error::AppError::BadRequest(format!("invalid filter: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::doc;
    use serde_json::json;

    #[test]
    fn parses_query_filter() {
        let f = Filter::from_query(
            r#"{"where":{"title":"a"},"include":[{"relation":"owner"}],"limit":5}"#,
        )
        .unwrap();
        assert_eq!(f.where_.unwrap().get("title"), Some(&Value::from("a")));
        assert_eq!(f.include[0].relation, "owner");
        assert_eq!(f.limit, Some(5));
        assert!(Filter::from_query("not json").is_err());
    }

    #[test]
    fn and_where_wraps_existing_clause() {
        let f = Filter::new().where_eq("a", 1).and_where(doc(json!({ "b": 2 })));
        let w = f.where_.unwrap();
        assert!(w.contains_key("$and"));

        let f = Filter::new().and_where(doc(json!({ "b": 2 })));
        assert_eq!(f.where_.unwrap().get("b"), Some(&Value::Int(2)));
    }
}
