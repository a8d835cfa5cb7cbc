//! Turns model declarations into a frozen [`Runtime`]: register models on their
//! datasources, attach built-in behaviors, add RoleMapping, resolve relations, compile and
//! persist policies, freeze the registry.

use crate::auth::{BcryptHasher, JwtSigner, LoginHandler, SecretHasher, TokenSigner, ROLE_MAPPING_MODEL};
use crate::behaviors::{register_crud, register_timestamps, role_mapping_config, Crud, UserBeforeSave};
use crate::config::{load_project, BaseModel, GlobalModelConfig, ModelConfig, Settings};
use crate::datasource::{connect_all, Datasource};
use crate::error::{AppError, ConfigError};
use crate::model::pipeline::{BEFORE_SAVE, LOGIN};
use crate::model::{EventContext, Model, ModelRegistry, ModelRegistryBuilder};
use crate::policy::{compile, store, AccessRequest, Enforcer};
use crate::value::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

type Configure = Box<dyn FnOnce(&mut ModelRegistryBuilder) -> Result<(), ConfigError> + Send>;

pub struct Runtime {
    pub registry: Arc<ModelRegistry>,
    pub settings: Settings,
    pub signer: Arc<dyn TokenSigner>,
    pub hasher: Arc<dyn SecretHasher>,
    pub enforcer: Enforcer,
}

impl Runtime {
    pub fn builder(settings: Settings) -> RuntimeBuilder {
        RuntimeBuilder {
            settings,
            datasources: HashMap::new(),
            models: Vec::new(),
            model_config: GlobalModelConfig::new(),
            hasher: None,
            signer: None,
            enforcer: None,
            configure: Vec::new(),
        }
    }

    /// Load `common/models/*.json`, `server/model-config.json` and the datasources file
    /// from `root`, connect datasources and build.
    pub async fn from_project_dir(root: &Path, settings: Settings) -> Result<Runtime, ConfigError> {
        let project = load_project(root, settings.env.as_deref())?;
        let datasources = connect_all(&project.datasources).await?;
        let mut builder = Runtime::builder(settings).model_config(project.model_config);
        for (name, ds) in datasources {
            builder = builder.datasource(&name, ds);
        }
        for model in project.models {
            builder = builder.model(model);
        }
        builder.build()
    }

    /// Root context for a new request.
    pub fn context(&self) -> EventContext {
        EventContext::new(self.registry.clone())
    }

    pub fn model(&self, name: &str) -> Result<&Arc<Model>, AppError> {
        self.registry.find(name)
    }

    /// Check `action` on `model` for the context's bearer.
    pub async fn authorize(
        &self,
        model: &Arc<Model>,
        action: &str,
        object_id: Option<&Value>,
        ctx: &EventContext,
    ) -> Result<(), AppError> {
        let req = AccessRequest {
            bearer: &ctx.bearer,
            model,
            object_id,
            action,
        };
        self.enforcer.authorize(&req, ctx).await
    }
}

pub struct RuntimeBuilder {
    settings: Settings,
    datasources: HashMap<String, Arc<dyn Datasource>>,
    models: Vec<ModelConfig>,
    model_config: GlobalModelConfig,
    hasher: Option<Arc<dyn SecretHasher>>,
    signer: Option<Arc<dyn TokenSigner>>,
    enforcer: Option<Enforcer>,
    configure: Vec<Configure>,
}

impl RuntimeBuilder {
    pub fn datasource(mut self, name: &str, ds: Arc<dyn Datasource>) -> Self {
        self.datasources.insert(name.to_string(), ds);
        self
    }

    pub fn model(mut self, config: ModelConfig) -> Self {
        self.models.push(config);
        self
    }

    pub fn model_config(mut self, model_config: GlobalModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn SecretHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn TokenSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn enforcer(mut self, enforcer: Enforcer) -> Self {
        self.enforcer = Some(enforcer);
        self
    }

    /// Run `f` on the registry builder after built-in behaviors are attached and before
    /// relations are resolved; used to add custom handlers.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut ModelRegistryBuilder) -> Result<(), ConfigError> + Send + 'static,
    {
        self.configure.push(Box::new(f));
        self
    }

    /// Declared datasource, then the global model config, then the only datasource.
    fn datasource_for(&self, config: &ModelConfig) -> Result<Arc<dyn Datasource>, ConfigError> {
        let name = match (&config.datasource, self.model_config.get(&config.name)) {
            (Some(ds), _) => ds.clone(),
            (None, Some(entry)) => entry.datasource.clone(),
            (None, None) => match self.datasources.values().next() {
                Some(ds) if self.datasources.len() == 1 => return Ok(ds.clone()),
                _ => return Err(ConfigError::MissingModel(config.name.clone())),
            },
        };
        self.datasources
            .get(&name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingDatasource {
                model: config.name.clone(),
                datasource: name,
            })
    }

    pub fn build(self) -> Result<Runtime, ConfigError> {
        let hasher = self
            .hasher
            .clone()
            .unwrap_or_else(|| Arc::new(BcryptHasher::new(self.settings.bcrypt_cost)) as Arc<dyn SecretHasher>);
        let signer = self
            .signer
            .clone()
            .unwrap_or_else(|| Arc::new(JwtSigner::new(&self.settings.jwt_secret)) as Arc<dyn TokenSigner>);

        let mut builder = ModelRegistryBuilder::new();
        for config in &self.models {
            let ds = self.datasource_for(config)?;
            builder.register(config.clone(), ds)?;
        }

        let user_model = self
            .models
            .iter()
            .find(|m| m.base == BaseModel::User)
            .map(|m| m.name.clone());
        let role_model = self
            .models
            .iter()
            .find(|m| m.base == BaseModel::Role)
            .map(|m| (m.name.clone(), self.datasource_for(m)));

        for draft in builder.drafts_mut() {
            if draft.config.public {
                register_crud(draft);
                register_timestamps(draft);
            }
            if draft.config.base == BaseModel::User {
                draft.observe(BEFORE_SAVE, Arc::new(UserBeforeSave::new(hasher.clone())));
                draft.on(
                    LOGIN,
                    Arc::new(LoginHandler::new(
                        hasher.clone(),
                        signer.clone(),
                        self.settings.token_ttl_ms,
                    )),
                );
                draft.on(Crud::FindSelf.event(), Arc::new(Crud::FindSelf));
            }
        }

        if let Some((role, ds)) = role_model {
            if !builder.contains(ROLE_MAPPING_MODEL) {
                let config = role_mapping_config(&role, user_model.as_deref());
                tracing::info!(role_model = %role, "registering RoleMapping");
                builder.register(config, ds?)?;
            }
        }

        for f in self.configure {
            f(&mut builder)?;
        }

        builder.resolve_relations();

        let dir = self.settings.policies_output_dir.clone();
        for draft in builder.drafts_mut() {
            let policy = compile(&draft.config)?;
            store::save(&policy, &dir)?;
            draft.set_policy(policy);
        }

        let registry = builder.build();
        tracing::info!(models = registry.len(), policies = %dir.display(), "runtime ready");
        Ok(Runtime {
            registry,
            settings: self.settings,
            signer,
            hasher,
            enforcer: self.enforcer.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemoryDatasource;

    fn settings(dir: &Path) -> Settings {
        Settings::default()
            .with_policies_output_dir(dir)
            .with_bcrypt_cost(4)
    }

    #[test]
    fn builds_with_role_mapping_and_policy_files() {
        let tmp = tempfile::tempdir().unwrap();
        let rt = Runtime::builder(settings(tmp.path()))
            .datasource("db", Arc::new(MemoryDatasource::new("db")))
            .model(ModelConfig::new("Account", BaseModel::User).with_hidden(&["password"]))
            .model(ModelConfig::new("Role", BaseModel::Role))
            .build()
            .unwrap();

        let mapping = rt.model("RoleMapping").unwrap();
        assert!(!mapping.is_public());
        assert!(!mapping.has_event("findMany"));
        assert_eq!(mapping.relation("user").unwrap().model, "Account");
        assert_eq!(mapping.relation("role").unwrap().foreign_key.as_deref(), Some("roleId"));

        let account = rt.model("Account").unwrap();
        assert!(account.has_event("login"));
        assert!(account.has_event("findSelf"));
        assert!(tmp.path().join("Account.policies.csv").exists());
        assert!(tmp.path().join("RoleMapping.model.conf").exists());
    }

    #[test]
    fn missing_datasource_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Runtime::builder(settings(tmp.path()))
            .datasource("db", Arc::new(MemoryDatasource::new("db")))
            .model(ModelConfig::new("Note", BaseModel::PersistedModel).with_datasource("other"))
            .build();
        assert!(matches!(err, Err(ConfigError::MissingDatasource { .. })));

        let none = Runtime::builder(settings(tmp.path()))
            .model(ModelConfig::new("Note", BaseModel::PersistedModel))
            .build();
        assert!(matches!(none, Err(ConfigError::MissingModel(_))));
    }
}
