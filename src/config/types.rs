//! Raw config types matching the JSON declarations (common/models/*.json, model-config.json,
//! datasources.json).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Base type tag: determines which built-in behaviors attach to a model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseModel {
    #[default]
    PersistedModel,
    /// Authentication subject: login, password hashing, email uniqueness.
    User,
    /// Role names; enables the companion RoleMapping model.
    Role,
    #[serde(other)]
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationType {
    BelongsTo,
    HasOne,
    HasMany,
    HasAndBelongsToMany,
}

impl RelationType {
    pub fn is_single(self) -> bool {
        matches!(self, RelationType::BelongsTo | RelationType::HasOne)
    }

    pub fn is_many(self) -> bool {
        !self.is_single()
    }
}

/// Relation declaration. `primary_key` and `foreign_key` are filled in at bootstrap
/// when left unset (see [`crate::model::resolve_relations`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    #[serde(rename = "type")]
    pub kind: RelationType,
    pub model: String,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Join model for hasAndBelongsToMany.
    #[serde(default)]
    pub through: Option<String>,
    /// Field on the join model pointing at the target (hasAndBelongsToMany).
    #[serde(default)]
    pub key_through: Option<String>,
}

impl Relation {
    pub fn new(kind: RelationType, model: impl Into<String>) -> Self {
        Relation {
            kind,
            model: model.into(),
            primary_key: None,
            foreign_key: None,
            through: None,
            key_through: None,
        }
    }

    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }
}

/// ACL policy strings and optional overrides of the policy-model grammar sections.
/// Overrides of `policy_effect` and `matchers_definition` may contain `$default`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasbinConfig {
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub request_definition: Option<String>,
    #[serde(default)]
    pub policy_definition: Option<String>,
    #[serde(default)]
    pub role_definition: Option<String>,
    #[serde(default)]
    pub policy_effect: Option<String>,
    #[serde(default)]
    pub matchers_definition: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub base: BaseModel,
    #[serde(default = "default_true")]
    pub public: bool,
    /// Fields stripped from every serialized instance (e.g. password hashes).
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
    #[serde(default)]
    pub casbin: CasbinConfig,
    /// Datasource name; when absent the global model config decides.
    #[serde(default)]
    pub datasource: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, base: BaseModel) -> Self {
        ModelConfig {
            name: name.into(),
            plural: None,
            base,
            public: true,
            hidden: Vec::new(),
            relations: BTreeMap::new(),
            casbin: CasbinConfig::default(),
            datasource: None,
        }
    }

    pub fn with_relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn with_hidden(mut self, fields: &[&str]) -> Self {
        self.hidden = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_policies(mut self, policies: &[&str]) -> Self {
        self.casbin.policies = policies.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_datasource(mut self, datasource: impl Into<String>) -> Self {
        self.datasource = Some(datasource.into());
        self
    }
}

/// One entry of model-config.json.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDatasourceEntry {
    pub datasource: String,
}

/// model-config.json: model name -> datasource.
pub type GlobalModelConfig = HashMap<String, ModelDatasourceEntry>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    Memory,
    Postgres,
}

/// One entry of datasources.json.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub connector: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
}

impl DatasourceConfig {
    pub fn connector(&self) -> Option<Connector> {
        match self.connector.to_lowercase().as_str() {
            "memory" => Some(Connector::Memory),
            "postgres" | "postgresql" => Some(Connector::Postgres),
            _ => None,
        }
    }
}

/// All declarations for one project, in memory.
#[derive(Clone, Debug, Default)]
pub struct ProjectConfig {
    pub models: Vec<ModelConfig>,
    pub model_config: GlobalModelConfig,
    pub datasources: BTreeMap<String, DatasourceConfig>,
}
