//! Login: credential check, role aggregation through RoleMapping, signed claims.
//!
//! Every failure after the request is accepted reads as [`AppError::LoginFailed`] so the
//! caller cannot tell an unknown email from a wrong password.

use crate::auth::{verify_blocking, Claims, SecretHasher, TokenSigner};
use crate::datasource::Filter;
use crate::error::AppError;
use crate::model::{EventContext, EventHandler, Instance, Model};
use crate::value::{doc, ObjectId, Value};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

/// Role every authenticated user carries.
pub const DEFAULT_ROLE: &str = "USER";
pub const ROLE_MAPPING_MODEL: &str = "RoleMapping";

pub struct LoginHandler {
    hasher: Arc<dyn SecretHasher>,
    signer: Arc<dyn TokenSigner>,
    ttl_ms: i64,
}

impl LoginHandler {
    pub fn new(hasher: Arc<dyn SecretHasher>, signer: Arc<dyn TokenSigner>, ttl_ms: i64) -> Self {
        LoginHandler {
            hasher,
            signer,
            ttl_ms,
        }
    }
}

/// Collapse any error into the generic login failure, keeping the cause in the log.
fn login_failed<'a>(model: &'a Model, step: &'static str) -> impl FnOnce(AppError) -> AppError + 'a {
    move |e| {
        tracing::warn!(model = %model.name(), step, error = %e, "login failed");
        AppError::LoginFailed
    }
}

fn non_blank<'a>(data: Option<&'a crate::value::M>, key: &str) -> Option<&'a str> {
    data?
        .get(key)?
        .as_str()
        .filter(|s| !s.trim().is_empty())
}

/// Role names granted to `user` through RoleMapping records. Principal ids were written
/// both as strings and as typed ids, so both forms are matched.
pub async fn find_user_roles(user: &Instance, ctx: &EventContext) -> Result<Vec<String>, AppError> {
    let mut roles = vec![DEFAULT_ROLE.to_string()];
    let Some(mapping) = ctx.registry().get(ROLE_MAPPING_MODEL).cloned() else {
        return Ok(roles);
    };
    let hex = user.id().id_string();
    let mut principal_ids = vec![Value::from(json!({ "principalId": hex.clone() }))];
    if let Ok(oid) = ObjectId::parse_str(&hex) {
        let mut by_oid = crate::value::M::new();
        by_oid.insert("principalId".into(), Value::ObjectId(oid));
        principal_ids.push(Value::Map(by_oid));
    }
    let mut where_ = doc(json!({ "principalType": "USER" }));
    where_.insert("$or".into(), Value::Array(principal_ids));
    let filter = Filter::with_where(where_).include("role");

    let sys = ctx.system_child();
    let mappings = mapping.find_many(&filter, &sys).await?;
    for m in &mappings {
        let name = m.get_one("role").map(|r| r.get_string("name")).unwrap_or_default();
        if !name.is_empty() && !roles.contains(&name) {
            roles.push(name);
        }
    }
    Ok(roles)
}

#[async_trait]
impl EventHandler for LoginHandler {
    async fn handle(&self, model: &Arc<Model>, ctx: &mut EventContext) -> Result<(), AppError> {
        let (email, password) = match (
            non_blank(ctx.data.as_ref(), "email"),
            non_blank(ctx.data.as_ref(), "password"),
        ) {
            (Some(e), Some(p)) => (e.trim().to_string(), p.to_string()),
            _ => return Err(AppError::LoginFailed),
        };

        let sys = ctx.system_child();
        let filter = Filter::new().where_eq("email", email.as_str());
        let found = model
            .find_one(&filter, &sys)
            .await
            .map_err(login_failed(model, "lookup"))?;
        let Some(user) = found else {
            tracing::debug!(model = %model.name(), "login: no such user");
            return Err(AppError::LoginFailed);
        };

        let stored = user.get_string("password");
        let matches = verify_blocking(&self.hasher, password, stored)
            .await
            .map_err(login_failed(model, "verify"))?;
        if !matches {
            return Err(AppError::LoginFailed);
        }

        let roles = find_user_roles(&user, ctx)
            .await
            .map_err(login_failed(model, "roles"))?;
        let user_id = user.id().id_string();
        let claims = Claims::new(user_id.clone(), self.ttl_ms, roles);
        let token = self
            .signer
            .sign(&claims)
            .map_err(login_failed(model, "sign"))?;
        tracing::info!(model = %model.name(), user_id = %user_id, "login succeeded");

        ctx.result = Some(json!({ "id": token, "userId": user_id }));
        ctx.status_code = StatusCode::OK;
        Ok(())
    }
}
