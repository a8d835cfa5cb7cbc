//! Principal descriptor carried by every event context.

use crate::auth::Claims;
use crate::value::M;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BearerUser {
    pub id: String,
    /// Synthetic principal used for internal lookups; bypasses authorization.
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub data: M,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerRole {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BearerToken {
    pub user: Option<BearerUser>,
    pub roles: Vec<BearerRole>,
}

impl BearerToken {
    pub fn anonymous() -> Self {
        BearerToken::default()
    }

    pub fn system() -> Self {
        BearerToken {
            user: Some(BearerUser {
                id: "system".into(),
                system: true,
                data: M::new(),
            }),
            roles: Vec::new(),
        }
    }

    pub fn from_claims(claims: &Claims) -> Self {
        BearerToken {
            user: Some(BearerUser {
                id: claims.user_id.clone(),
                system: false,
                data: M::new(),
            }),
            roles: claims
                .roles
                .iter()
                .map(|name| BearerRole { name: name.clone() })
                .collect(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_system(&self) -> bool {
        self.user.as_ref().map(|u| u.system).unwrap_or(false)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }
}
