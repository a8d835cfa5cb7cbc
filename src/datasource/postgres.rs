//! PostgreSQL connector: every collection lives in one JSONB document table,
//! `{schema}.documents (collection, id, payload)`. The schema comes from the datasource
//! config or the `MODELSTACK_SCHEMA` env (default `modelstack`).
//!
//! `where` clauses are translated to parameterized SQL; identifiers come from config only,
//! every value is bound as text and cast in SQL.

use crate::datasource::{Datasource, Filter};
use crate::error::{AppError, ConfigError};
use crate::value::{ObjectId, Value, ID_FIELD, M};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub fn default_schema() -> String {
    std::env::var("MODELSTACK_SCHEMA").unwrap_or_else(|_| "modelstack".into())
}

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<String>,
}

impl QueryBuf {
    fn push_param(&mut self, v: impl Into<String>) -> usize {
        self.params.push(v.into());
        self.params.len()
    }
}

/// `{"a","b"}` array literal for a dotted field path, cast with `::text[]`.
fn path_literal(field: &str) -> String {
    let parts: Vec<String> = field
        .split('.')
        .map(|p| format!("\"{}\"", p.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", parts.join(","))
}

/// `{"a": {"b": value}}` for containment checks on a dotted path.
fn nested_json(field: &str, value: &Value) -> serde_json::Value {
    let mut out = value.to_extended_json();
    for part in field.rsplit('.') {
        let mut obj = serde_json::Map::new();
        obj.insert(part.to_string(), out);
        out = serde_json::Value::Object(obj);
    }
    out
}

fn containment(q: &mut QueryBuf, field: &str, value: &Value) -> String {
    if value.is_null() {
        let n = q.push_param(path_literal(field));
        return format!(
            "(payload #> ${n}::text[] IS NULL OR jsonb_typeof(payload #> ${n}::text[]) = 'null')"
        );
    }
    let n = q.push_param(nested_json(field, value).to_string());
    format!("payload @> ${}::jsonb", n)
}

fn comparison(q: &mut QueryBuf, field: &str, op: &str, arg: &Value) -> String {
    let p = q.push_param(path_literal(field));
    let v = q.push_param(arg.coerce_string());
    match arg {
        Value::Int(_) | Value::Float(_) => {
            format!("(payload #>> ${}::text[])::numeric {} ${}::numeric", p, op, v)
        }
        _ => format!("(payload #>> ${}::text[]) {} ${}::text", p, op, v),
    }
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

fn field_condition(q: &mut QueryBuf, field: &str, cond: &Value) -> Result<String, AppError> {
    let ops = match cond {
        Value::Map(m) if !m.is_empty() && m.keys().all(|k| k.starts_with('$')) => m,
        _ => return Ok(containment(q, field, cond)),
    };
    let mut parts = Vec::new();
    for (op, arg) in ops {
        let part = match op.as_str() {
            "$eq" => containment(q, field, arg),
            "$ne" => format!("NOT ({})", containment(q, field, arg)),
            "$in" | "$nin" => {
                let Value::Array(items) = arg else {
                    return Err(AppError::InvalidInput(format!("{} expects an array", op)));
                };
                let any = if items.is_empty() {
                    "FALSE".to_string()
                } else {
                    let alts: Vec<String> = items.iter().map(|v| containment(q, field, v)).collect();
                    format!("({})", alts.join(" OR "))
                };
                if op == "$in" {
                    any
                } else {
                    format!("NOT {}", any)
                }
            }
            "$exists" => {
                let n = q.push_param(path_literal(field));
                let null_check = if arg.coerce_bool(true) { "IS NOT NULL" } else { "IS NULL" };
                format!("(payload #> ${}::text[]) {}", n, null_check)
            }
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| AppError::InvalidInput("$regex expects a string".into()))?;
                let insensitive = ops
                    .get("$options")
                    .and_then(Value::as_str)
                    .map(|o| o.contains('i'))
                    .unwrap_or(false);
                let p = q.push_param(path_literal(field));
                let r = q.push_param(pattern);
                let op = if insensitive { "~*" } else { "~" };
                format!("(payload #>> ${}::text[]) {} ${}::text", p, op, r)
            }
            "$options" => continue,
            "$gt" => comparison(q, field, ">", arg),
            "$gte" => comparison(q, field, ">=", arg),
            "$lt" => comparison(q, field, "<", arg),
            "$lte" => comparison(q, field, "<=", arg),
            other => return Err(AppError::InvalidInput(format!("unsupported operator {}", other))),
        };
        parts.push(part);
    }
    Ok(if parts.is_empty() {
        "TRUE".to_string()
    } else {
        parts.join(" AND ")
    })
}

/// Translate a `where` mapping into a boolean SQL expression.
pub fn where_sql(q: &mut QueryBuf, where_: &M) -> Result<String, AppError> {
    let mut parts = Vec::new();
    for (key, cond) in where_ {
        let part = match key.as_str() {
            "$or" | "$and" => {
                let joiner = if key == "$or" { " OR " } else { " AND " };
                let mut subs = Vec::new();
                for sub in sub_clauses(key, cond)? {
                    subs.push(format!("({})", where_sql(q, sub)?));
                }
                if subs.is_empty() {
                    if key == "$or" { "FALSE".into() } else { "TRUE".into() }
                } else {
                    format!("({})", subs.join(joiner))
                }
            }
            op if op.starts_with('$') => {
                return Err(AppError::InvalidInput(format!("unsupported operator {}", op)))
            }
            field => field_condition(q, field, cond)?,
        };
        parts.push(part);
    }
    Ok(if parts.is_empty() {
        "TRUE".to_string()
    } else {
        parts.join(" AND ")
    })
}

fn payload_to_doc(payload: serde_json::Value) -> M {
    Value::from(payload).into_map().unwrap_or_default()
}

pub struct PostgresDatasource {
    name: String,
    pool: PgPool,
    table: String,
}

impl PostgresDatasource {
    pub async fn connect(name: &str, url: &str, schema: Option<&str>) -> Result<Self, ConfigError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        let ds = Self::from_pool(name, pool, schema);
        ds.ensure_table().await?;
        Ok(ds)
    }

    pub fn from_pool(name: &str, pool: PgPool, schema: Option<&str>) -> Self {
        let schema = schema.map(str::to_string).unwrap_or_else(default_schema);
        PostgresDatasource {
            name: name.to_string(),
            pool,
            table: format!("{}.{}", quoted(&schema), quoted("documents")),
        }
    }

    /// Create the schema and document table if not exists.
    pub async fn ensure_table(&self) -> Result<(), ConfigError> {
        let schema = self.table.split('.').next().unwrap_or_default().to_string();
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&self.pool)
            .await?;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                payload JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, id)
            )
            "#,
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// SELECT for a collection with translated where, ORDER BY, LIMIT/OFFSET.
    pub fn select_query(&self, collection: &str, filter: &Filter, count_only: bool) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::default();
        let c = q.push_param(collection);
        let cond = match &filter.where_ {
            Some(w) => where_sql(&mut q, w)?,
            None => "TRUE".to_string(),
        };
        if count_only {
            q.sql = format!(
                "SELECT COUNT(*) FROM {} WHERE collection = ${}::text AND ({})",
                self.table, c, cond
            );
            return Ok(q);
        }
        let mut sql = format!(
            "SELECT payload FROM {} WHERE collection = ${}::text AND ({})",
            self.table, c, cond
        );
        if let Some(order) = &filter.order {
            let mut parts = order.split_whitespace();
            if let Some(field) = parts.next() {
                let dir = match parts.next() {
                    Some(d) if d.eq_ignore_ascii_case("desc") => "DESC",
                    _ => "ASC",
                };
                let p = q.push_param(path_literal(field));
                sql.push_str(&format!(" ORDER BY payload #> ${}::text[] {}", p, dir));
            }
        }
        if let Some(limit) = filter.limit {
            let p = q.push_param(limit.to_string());
            sql.push_str(&format!(" LIMIT ${}::bigint", p));
        }
        if let Some(skip) = filter.skip {
            let p = q.push_param(skip.to_string());
            sql.push_str(&format!(" OFFSET ${}::bigint", p));
        }
        q.sql = sql;
        Ok(q)
    }

    async fn fetch_payloads(&self, q: &QueryBuf) -> Result<Vec<M>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, serde_json::Value>(&q.sql);
        for p in &q.params {
            query = query.bind(p.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(payload_to_doc).collect())
    }
}

#[async_trait]
impl Datasource for PostgresDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<M>, AppError> {
        let q = self.select_query(collection, filter, false)?;
        self.fetch_payloads(&q).await
    }

    async fn find_by_id(&self, collection: &str, id: &Value) -> Result<Option<M>, AppError> {
        let q = QueryBuf {
            sql: format!(
                "SELECT payload FROM {} WHERE collection = $1::text AND id = $2::text",
                self.table
            ),
            params: vec![collection.to_string(), id.id_string()],
        };
        Ok(self.fetch_payloads(&q).await?.into_iter().next())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AppError> {
        let q = self.select_query(collection, filter, true)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p.as_str());
        }
        Ok(query.fetch_one(&self.pool).await?.max(0) as u64)
    }

    async fn create(&self, collection: &str, mut data: M) -> Result<M, AppError> {
        let id = data
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| Value::ObjectId(ObjectId::new()))
            .clone();
        let payload = Value::Map(data).to_extended_json().to_string();
        let q = QueryBuf {
            sql: format!(
                "INSERT INTO {} (collection, id, payload) VALUES ($1::text, $2::text, $3::jsonb) RETURNING payload",
                self.table
            ),
            params: vec![collection.to_string(), id.id_string(), payload],
        };
        self.fetch_payloads(&q)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Datasource(format!("insert into {} returned no row", collection)))
    }

    async fn update_by_id(&self, collection: &str, id: &Value, data: &M) -> Result<Option<M>, AppError> {
        let mut patch = data.clone();
        patch.remove(ID_FIELD);
        let q = QueryBuf {
            sql: format!(
                "UPDATE {} SET payload = payload || $3::jsonb, updated_at = NOW() WHERE collection = $1::text AND id = $2::text RETURNING payload",
                self.table
            ),
            params: vec![
                collection.to_string(),
                id.id_string(),
                Value::Map(patch).to_extended_json().to_string(),
            ],
        };
        Ok(self.fetch_payloads(&q).await?.into_iter().next())
    }

    async fn delete_by_id(&self, collection: &str, id: &Value) -> Result<u64, AppError> {
        let sql = format!(
            "DELETE FROM {} WHERE collection = $1::text AND id = $2::text",
            self.table
        );
        tracing::debug!(sql = %sql, "query");
        let result = sqlx::query(&sql)
            .bind(collection)
            .bind(id.id_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
