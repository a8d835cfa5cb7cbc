//! Config validation: every model is mapped to a known datasource, names and plurals are unique.

use crate::case::pluralize;
use crate::config::ProjectConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &ProjectConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut plurals = HashSet::new();

    for model in &config.models {
        if model.name.trim().is_empty() {
            return Err(ConfigError::Validation("model name must not be empty".into()));
        }
        if !names.insert(model.name.as_str()) {
            return Err(ConfigError::DuplicateModel(model.name.clone()));
        }
        let plural = model.plural.clone().unwrap_or_else(|| pluralize(&model.name));
        if !plurals.insert(plural.clone()) {
            return Err(ConfigError::DuplicatePlural(plural));
        }

        let datasource = match &model.datasource {
            Some(ds) => ds.clone(),
            None => config
                .model_config
                .get(&model.name)
                .map(|entry| entry.datasource.clone())
                .ok_or_else(|| ConfigError::MissingModel(model.name.clone()))?,
        };
        let ds = config
            .datasources
            .get(&datasource)
            .ok_or_else(|| ConfigError::MissingDatasource {
                model: model.name.clone(),
                datasource: datasource.clone(),
            })?;
        if ds.connector().is_none() {
            return Err(ConfigError::UnsupportedConnector(ds.connector.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseModel, DatasourceConfig, ModelConfig, ModelDatasourceEntry};

    fn project(models: Vec<ModelConfig>) -> ProjectConfig {
        let mut config = ProjectConfig {
            models,
            ..Default::default()
        };
        config.datasources.insert(
            "db".into(),
            DatasourceConfig {
                name: None,
                connector: "memory".into(),
                url: None,
                database: None,
                schema: None,
            },
        );
        for m in &config.models {
            config.model_config.insert(
                m.name.clone(),
                ModelDatasourceEntry {
                    datasource: "db".into(),
                },
            );
        }
        config
    }

    #[test]
    fn accepts_valid_project() {
        let config = project(vec![
            ModelConfig::new("Note", BaseModel::PersistedModel),
            ModelConfig::new("User", BaseModel::User),
        ]);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_duplicate_plural() {
        let mut a = ModelConfig::new("Note", BaseModel::PersistedModel);
        a.plural = Some("things".into());
        let mut b = ModelConfig::new("Thing", BaseModel::PersistedModel);
        b.plural = Some("things".into());
        let err = validate(&project(vec![a, b])).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePlural(p) if p == "things"));
    }

    #[test]
    fn rejects_model_without_datasource() {
        let mut config = project(vec![ModelConfig::new("Note", BaseModel::PersistedModel)]);
        config.model_config.clear();
        assert!(matches!(validate(&config), Err(ConfigError::MissingModel(_))));
    }

    #[test]
    fn rejects_unknown_connector() {
        let mut config = project(vec![ModelConfig::new("Note", BaseModel::PersistedModel)]);
        config.datasources.get_mut("db").unwrap().connector = "redis".into();
        assert!(matches!(validate(&config), Err(ConfigError::UnsupportedConnector(_))));
    }
}
