use crate::auth::ROLE_MAPPING_MODEL;
use crate::config::{BaseModel, ModelConfig, Relation, RelationType};

/// Companion join model between principals and roles. Records carry `principalType`,
/// `principalId` and `roleId`.
pub fn role_mapping_config(role_model: &str, user_model: Option<&str>) -> ModelConfig {
    let mut cfg = ModelConfig::new(ROLE_MAPPING_MODEL, BaseModel::PersistedModel)
        .with_relation(
            "role",
            Relation::new(RelationType::BelongsTo, role_model).with_foreign_key("roleId"),
        )
        .with_relation(
            "user",
            Relation::new(RelationType::BelongsTo, user_model.unwrap_or("user"))
                .with_foreign_key("principalId"),
        )
        .with_policies(&["$owner,*,__get__role,allow"]);
    cfg.public = false;
    cfg
}
