//! In-process evaluation of a compiled policy with the default matcher semantics:
//! owner check, subject/role membership, `*` key matching and the `read`/`write` action
//! groups. Rows are tried in order; the first match decides. No match denies.

use crate::auth::BearerToken;
use crate::config::BaseModel;
use crate::error::AppError;
use crate::model::pipeline::{
    COUNT, CREATE, DELETE, FIND_BY_ID, FIND_MANY, FIND_ONE, FIND_SELF, UPDATE_ATTRIBUTES,
};
use crate::model::{EventContext, Model};
use crate::policy::{Effect, PolicyRule, AUTHENTICATED, EVERYONE, OWNER};
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

pub const READ_ACTIONS: [&str; 5] = [FIND_MANY, FIND_BY_ID, FIND_ONE, COUNT, FIND_SELF];
pub const WRITE_ACTIONS: [&str; 3] = [CREATE, UPDATE_ATTRIBUTES, DELETE];

/// Fields naming the owning principal of a record.
pub const OWNER_FIELDS: [&str; 2] = ["userId", "ownerId"];

/// Decides whether `subject` owns the record `object_id` of `model`.
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    async fn is_owner(
        &self,
        model: &Arc<Model>,
        subject: &str,
        object_id: &Value,
        ctx: &EventContext,
    ) -> Result<bool, AppError>;
}

/// Users own their own record; other records are owned through `userId`/`ownerId`.
pub struct RecordOwnerLookup;

#[async_trait]
impl OwnerLookup for RecordOwnerLookup {
    async fn is_owner(
        &self,
        model: &Arc<Model>,
        subject: &str,
        object_id: &Value,
        ctx: &EventContext,
    ) -> Result<bool, AppError> {
        if model.base() == BaseModel::User {
            return Ok(object_id.id_string() == subject);
        }
        let sys = ctx.system_child();
        let id = match object_id {
            Value::String(s) => crate::value::ObjectId::parse_str(s)
                .map(Value::ObjectId)
                .unwrap_or_else(|_| object_id.clone()),
            other => other.clone(),
        };
        let Some(record) = model.find_by_id(&id, None, &sys).await? else {
            return Ok(false);
        };
        Ok(OWNER_FIELDS.iter().any(|f| {
            record
                .data()
                .get(*f)
                .map(|v| v.id_string() == subject)
                .unwrap_or(false)
        }))
    }
}

/// `*` matches anything; a trailing `*` matches a prefix.
pub fn key_match(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Action group membership (`g(r.act, p.act)`).
pub fn action_in_group(action: &str, group: &str) -> bool {
    match group {
        "read" => READ_ACTIONS.contains(&action),
        "write" => WRITE_ACTIONS.contains(&action),
        _ => false,
    }
}

pub struct AccessRequest<'a> {
    pub bearer: &'a BearerToken,
    pub model: &'a Arc<Model>,
    pub object_id: Option<&'a Value>,
    pub action: &'a str,
}

pub struct Enforcer {
    owner_lookup: Arc<dyn OwnerLookup>,
}

impl Default for Enforcer {
    fn default() -> Self {
        Enforcer::new(Arc::new(RecordOwnerLookup))
    }
}

impl Enforcer {
    pub fn new(owner_lookup: Arc<dyn OwnerLookup>) -> Self {
        Enforcer { owner_lookup }
    }

    async fn subject_matches(
        &self,
        rule: &PolicyRule,
        req: &AccessRequest<'_>,
        ctx: &EventContext,
    ) -> Result<bool, AppError> {
        let user_id = req.bearer.user_id();
        Ok(match rule.subject.as_str() {
            EVERYONE => true,
            AUTHENTICATED => req.bearer.is_authenticated(),
            OWNER => match (user_id, req.object_id) {
                (Some(uid), Some(oid)) => {
                    self.owner_lookup.is_owner(req.model, uid, oid, ctx).await?
                }
                _ => false,
            },
            sub => user_id == Some(sub) || req.bearer.has_role(sub),
        })
    }

    /// Evaluate `req` against the model's compiled rules. System principals are always
    /// allowed; a model without a compiled policy denies.
    pub async fn enforce(&self, req: &AccessRequest<'_>, ctx: &EventContext) -> Result<bool, AppError> {
        if req.bearer.is_system() {
            return Ok(true);
        }
        let Some(policy) = req.model.policy() else {
            return Ok(false);
        };
        if !policy.uses_default_matcher() {
            tracing::debug!(model = %req.model.name(), "custom matcher, evaluating default semantics");
        }
        for rule in &policy.rules {
            if !key_match(req.model.name(), &rule.object) {
                continue;
            }
            if !(action_in_group(req.action, &rule.action) || key_match(req.action, &rule.action)) {
                continue;
            }
            if self.subject_matches(rule, req, ctx).await? {
                tracing::debug!(model = %req.model.name(), action = %req.action, rule = %rule, "policy matched");
                return Ok(rule.effect == Effect::Allow);
            }
        }
        Ok(false)
    }

    /// Like [`Enforcer::enforce`], mapping a denial to `Unauthorized` (no principal) or
    /// `Forbidden`.
    pub async fn authorize(&self, req: &AccessRequest<'_>, ctx: &EventContext) -> Result<(), AppError> {
        if self.enforce(req, ctx).await? {
            return Ok(());
        }
        let what = format!("{}.{}", req.model.name(), req.action);
        if req.bearer.is_authenticated() {
            Err(AppError::Forbidden(what))
        } else {
            Err(AppError::Unauthorized(what))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matching() {
        assert!(key_match("Note", "*"));
        assert!(key_match("Note", "Note"));
        assert!(key_match("findMany", "find*"));
        assert!(!key_match("create", "find*"));
        assert!(!key_match("Note", "Notes"));
    }

    #[test]
    fn action_groups() {
        assert!(action_in_group("findById", "read"));
        assert!(action_in_group("findSelf", "read"));
        assert!(action_in_group("instance_delete", "write"));
        assert!(!action_in_group("login", "read"));
        assert!(!action_in_group("findMany", "write"));
    }
}
