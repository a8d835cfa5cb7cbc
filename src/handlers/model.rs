//! Model handlers: map REST calls onto model events. Authorization runs before the event
//! fires; the event's result and status code become the response.

use crate::datasource::Filter;
use crate::error::AppError;
use crate::extractors::Bearer;
use crate::model::pipeline::{
    COUNT, CREATE, DELETE, FIND_BY_ID, FIND_MANY, FIND_SELF, LOGIN, UPDATE_ATTRIBUTES,
};
use crate::model::{EventContext, Model};
use crate::state::AppState;
use crate::value::{ObjectId, Value, M};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    /// JSON-encoded filter.
    pub filter: Option<String>,
    /// JSON-encoded `where` (count).
    #[serde(rename = "where")]
    pub where_: Option<String>,
}

impl FilterQuery {
    fn filter(&self) -> Result<Option<Filter>, AppError> {
        self.filter.as_deref().map(Filter::from_query).transpose()
    }

    fn where_clause(&self) -> Result<Option<M>, AppError> {
        match &self.where_ {
            Some(raw) => {
                let json: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|e| AppError::BadRequest(format!("invalid where: {}", e)))?;
                match Value::from(json) {
                    Value::Map(m) => Ok(Some(m)),
                    _ => Err(AppError::BadRequest("where must be an object".into())),
                }
            }
            None => Ok(self.filter()?.and_then(|f| f.where_)),
        }
    }
}

fn public_model(state: &AppState, plural: &str) -> Result<Arc<Model>, AppError> {
    state
        .runtime
        .registry
        .by_plural(plural)
        .filter(|m| m.is_public())
        .cloned()
        .ok_or_else(|| AppError::NotFound(plural.to_string()))
}

fn parse_id(raw: &str) -> Value {
    match ObjectId::parse_str(raw) {
        Ok(id) => Value::ObjectId(id),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn body_to_map(body: serde_json::Value) -> Result<M, AppError> {
    match Value::from(body) {
        Value::Map(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Authorize, dispatch `event`, render the context's result. No result means no body.
async fn run_event(
    state: &AppState,
    model: &Arc<Model>,
    event: &str,
    mut ctx: EventContext,
) -> Result<Response, AppError> {
    state
        .runtime
        .authorize(model, event, ctx.model_id.as_ref(), &ctx)
        .await?;
    model.trigger(event, &mut ctx).await?;
    Ok(match ctx.result.take() {
        Some(body) => (ctx.status_code, Json(body)).into_response(),
        None => ctx.status_code.into_response(),
    })
}

pub async fn list(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    Bearer(bearer): Bearer,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let mut ctx = state.runtime.context().with_bearer(bearer);
    ctx.filter = q.filter()?;
    run_event(&state, &model, FIND_MANY, ctx).await
}

pub async fn count(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    Bearer(bearer): Bearer,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let mut ctx = state.runtime.context().with_bearer(bearer);
    if let Some(where_) = q.where_clause()? {
        ctx.filter = Some(Filter::with_where(where_));
    }
    run_event(&state, &model, COUNT, ctx).await
}

pub async fn create(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    Bearer(bearer): Bearer,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let ctx = state
        .runtime
        .context()
        .with_bearer(bearer)
        .with_data(body_to_map(body)?);
    run_event(&state, &model, CREATE, ctx).await
}

pub async fn read(
    State(state): State<AppState>,
    Path((plural, id)): Path<(String, String)>,
    Bearer(bearer): Bearer,
    Query(q): Query<FilterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let mut ctx = state
        .runtime
        .context()
        .with_bearer(bearer)
        .with_model_id(parse_id(&id));
    ctx.filter = q.filter()?;
    run_event(&state, &model, FIND_BY_ID, ctx).await
}

pub async fn update(
    State(state): State<AppState>,
    Path((plural, id)): Path<(String, String)>,
    Bearer(bearer): Bearer,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let ctx = state
        .runtime
        .context()
        .with_bearer(bearer)
        .with_model_id(parse_id(&id))
        .with_data(body_to_map(body)?);
    run_event(&state, &model, UPDATE_ATTRIBUTES, ctx).await
}

pub async fn delete(
    State(state): State<AppState>,
    Path((plural, id)): Path<(String, String)>,
    Bearer(bearer): Bearer,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let ctx = state
        .runtime
        .context()
        .with_bearer(bearer)
        .with_model_id(parse_id(&id));
    run_event(&state, &model, DELETE, ctx).await
}

pub async fn login(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let data = body
        .map_err(|e| {
            tracing::debug!(error = %e, "login body rejected");
            AppError::LoginFailed
        })
        .and_then(|Json(body)| body_to_map(body).map_err(|_| AppError::LoginFailed))?;
    let ctx = state.runtime.context().with_data(data);
    run_event(&state, &model, LOGIN, ctx).await
}

pub async fn me(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    Bearer(bearer): Bearer,
) -> Result<impl IntoResponse, AppError> {
    let model = public_model(&state, &plural)?;
    let ctx = state.runtime.context().with_bearer(bearer);
    run_event(&state, &model, FIND_SELF, ctx).await
}
