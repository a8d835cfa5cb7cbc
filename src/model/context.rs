//! Event context: the per-operation unit carrying data, principal and result, plus its
//! lineage back to the request that started it.
//!
//! Every context shares one [`RequestScope`] with its root, so reaching request-level
//! state never walks the chain. Parent links only record which event spawned a nested
//! context; they point upward and cannot form a cycle.

use crate::auth::BearerToken;
use crate::datasource::Filter;
use crate::model::{Instance, ModelRegistry};
use crate::value::{Value, M};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// State shared by every context spawned for one inbound operation.
pub struct RequestScope {
    pub request_id: Uuid,
    pub registry: Arc<ModelRegistry>,
    pub started_at: DateTime<Utc>,
}

/// A link in the lineage: the event a context was handling when it spawned a child.
#[derive(Debug)]
pub struct Frame {
    pub event: Option<String>,
    pub depth: usize,
    pub parent: Option<Arc<Frame>>,
}

pub struct EventContext {
    /// Mutable payload for writes.
    pub data: Option<M>,
    /// Target record identifier.
    pub model_id: Option<Value>,
    pub filter: Option<Filter>,
    pub instance: Option<Instance>,
    pub bearer: BearerToken,
    pub result: Option<serde_json::Value>,
    pub status_code: StatusCode,
    pub is_new_instance: bool,
    /// Skip id normalization; set on synthetic system contexts.
    pub disable_type_conversions: bool,
    /// Structural hooks (e.g. `before save`) this operation must not run.
    pub disabled_observers: BTreeSet<String>,
    /// Event currently dispatched on this context.
    pub event: Option<String>,
    scope: Arc<RequestScope>,
    parent: Option<Arc<Frame>>,
    depth: usize,
}

impl EventContext {
    /// Root context for a new request.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let scope = Arc::new(RequestScope {
            request_id: Uuid::new_v4(),
            registry,
            started_at: Utc::now(),
        });
        EventContext::with_scope(scope, None, 0)
    }

    fn with_scope(scope: Arc<RequestScope>, parent: Option<Arc<Frame>>, depth: usize) -> Self {
        EventContext {
            data: None,
            model_id: None,
            filter: None,
            instance: None,
            bearer: BearerToken::anonymous(),
            result: None,
            status_code: StatusCode::OK,
            is_new_instance: false,
            disable_type_conversions: false,
            disabled_observers: BTreeSet::new(),
            event: None,
            scope,
            parent,
            depth,
        }
    }

    /// Nested context in the same request. Inherits the bearer only.
    pub fn child(&self) -> Self {
        let frame = Arc::new(Frame {
            event: self.event.clone(),
            depth: self.depth,
            parent: self.parent.clone(),
        });
        let mut child = EventContext::with_scope(self.scope.clone(), Some(frame), self.depth + 1);
        child.bearer = self.bearer.clone();
        child
    }

    /// Nested context for internal lookups: system principal, no type conversions.
    pub fn system_child(&self) -> Self {
        self.child()
            .with_bearer(BearerToken::system())
            .without_type_conversions()
    }

    pub fn with_bearer(mut self, bearer: BearerToken) -> Self {
        self.bearer = bearer;
        self
    }

    pub fn with_data(mut self, data: M) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_model_id(mut self, id: impl Into<Value>) -> Self {
        self.model_id = Some(id.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn without_type_conversions(mut self) -> Self {
        self.disable_type_conversions = true;
        self
    }

    pub fn disable_observer(mut self, hook: &str) -> Self {
        self.disabled_observers.insert(hook.to_string());
        self
    }

    pub fn is_observer_disabled(&self, hook: &str) -> bool {
        self.disabled_observers.contains(hook)
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.scope.registry
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    pub fn request_id(&self) -> Uuid {
        self.scope.request_id
    }

    /// 0 for the root context.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    /// Events from the innermost parent out to the root.
    pub fn lineage(&self) -> Vec<Option<String>> {
        let mut out = Vec::new();
        let mut cur = self.parent.as_ref();
        while let Some(frame) = cur {
            out.push(frame.event.clone());
            cur = frame.parent.as_ref();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRegistryBuilder;

    #[test]
    fn child_shares_scope_and_inherits_bearer() {
        let registry = ModelRegistryBuilder::new().build();
        let mut root = EventContext::new(registry).with_bearer(BearerToken::system());
        root.event = Some("login".into());
        root.disable_type_conversions = true;

        let child = root.child();
        assert_eq!(child.request_id(), root.request_id());
        assert_eq!(child.depth(), 1);
        assert!(child.bearer.is_system());
        assert!(!child.disable_type_conversions);
        assert_eq!(child.lineage(), vec![Some("login".to_string())]);

        let grandchild = child.child();
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(grandchild.lineage(), vec![None, Some("login".to_string())]);
        assert!(root.is_root() && !grandchild.is_root());
    }

    #[test]
    fn system_child_disables_conversions() {
        let registry = ModelRegistryBuilder::new().build();
        let root = EventContext::new(registry);
        let sys = root.system_child();
        assert!(sys.bearer.is_system());
        assert!(sys.disable_type_conversions);
        assert!(!root.bearer.is_authenticated());
    }
}
