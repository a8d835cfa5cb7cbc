#![allow(dead_code)]

use modelstack::config::Settings;
use modelstack::{
    BaseModel, Datasource, MemoryDatasource, ModelConfig, Relation, RelationType, Runtime,
};
use std::sync::Arc;
use tempfile::TempDir;

pub fn settings(dir: &TempDir) -> Settings {
    Settings::default()
        .with_policies_output_dir(dir.path())
        .with_bcrypt_cost(4)
}

pub fn account() -> ModelConfig {
    ModelConfig::new("Account", BaseModel::User)
        .with_hidden(&["password"])
        .with_relation("notes", Relation::new(RelationType::HasMany, "Note"))
}

pub fn note() -> ModelConfig {
    ModelConfig::new("Note", BaseModel::PersistedModel)
        .with_relation(
            "owner",
            Relation::new(RelationType::BelongsTo, "Account").with_foreign_key("userId"),
        )
        .with_policies(&[
            "$authenticated,*,read,allow",
            "$authenticated,*,create,allow",
            "$owner,*,write,allow",
        ])
}

pub fn runtime_with(ds: Arc<dyn Datasource>, dir: &TempDir) -> Runtime {
    Runtime::builder(settings(dir))
        .datasource("db", ds)
        .model(account())
        .model(ModelConfig::new("Role", BaseModel::Role))
        .model(note())
        .build()
        .expect("runtime")
}

pub fn runtime(dir: &TempDir) -> Runtime {
    runtime_with(Arc::new(MemoryDatasource::new("db")), dir)
}
