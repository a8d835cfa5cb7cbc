//! `before save` for authentication-subject models: email presence and uniqueness,
//! optional unique username, mandatory password hashed before it reaches storage.

use crate::auth::{hash_blocking, SecretHasher};
use crate::datasource::Filter;
use crate::error::AppError;
use crate::model::{EventContext, EventHandler, Model};
use crate::value::{doc, Value, M};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const EMAIL_PRESENCE: &str = "EMAIL_PRESENCE";
pub const EMAIL_UNIQUENESS: &str = "EMAIL_UNIQUENESS";
pub const USERNAME_UNIQUENESS: &str = "USERNAME_UNIQUENESS";
pub const PASSWORD_BLANK: &str = "PASSWORD_BLANK";

pub struct UserBeforeSave {
    hasher: Arc<dyn SecretHasher>,
}

impl UserBeforeSave {
    pub fn new(hasher: Arc<dyn SecretHasher>) -> Self {
        UserBeforeSave { hasher }
    }

    async fn on_create(&self, model: &Arc<Model>, data: &mut M, ctx: &EventContext) -> Result<(), AppError> {
        let email = data
            .get("email")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::validation(EMAIL_PRESENCE, "email is required", Some("email")))?;
        // stored trimmed so the anchored uniqueness match sees the same value
        data.insert("email".into(), Value::from(email.as_str()));

        let sys = ctx.system_child();
        let pattern = format!("^{}$", regex::escape(&email));
        let same_email = Filter::with_where(doc(json!({
            "email": { "$regex": pattern, "$options": "i" }
        })));
        if model.find_one(&same_email, &sys).await?.is_some() {
            return Err(AppError::Conflict {
                code: EMAIL_UNIQUENESS,
                model: model.name().to_string(),
                field: "email".into(),
                value: email,
            });
        }

        if let Some(username) = data.get("username").and_then(Value::as_str).filter(|s| !s.is_empty()) {
            let same_username = Filter::new().where_eq("username", username);
            if model.find_one(&same_username, &sys).await?.is_some() {
                return Err(AppError::Conflict {
                    code: USERNAME_UNIQUENESS,
                    model: model.name().to_string(),
                    field: "username".into(),
                    value: username.to_string(),
                });
            }
        }

        let password = data
            .get("password")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::validation(PASSWORD_BLANK, "password can't be blank", Some("password")))?;
        let hashed = hash_blocking(&self.hasher, password).await?;
        data.insert("password".into(), Value::String(hashed));
        Ok(())
    }

    async fn on_update(&self, data: &mut M) -> Result<(), AppError> {
        let new_password = data
            .get("password")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);
        match new_password {
            Some(plain) => {
                tracing::info!("updating user password");
                let hashed = hash_blocking(&self.hasher, plain).await?;
                data.insert("password".into(), Value::String(hashed));
            }
            None => {
                data.remove("password");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for UserBeforeSave {
    async fn handle(&self, model: &Arc<Model>, ctx: &mut EventContext) -> Result<(), AppError> {
        let mut data = ctx.data.take().unwrap_or_default();
        let outcome = if ctx.is_new_instance {
            self.on_create(model, &mut data, ctx).await
        } else {
            self.on_update(&mut data).await
        };
        ctx.data = Some(data);
        outcome
    }
}
