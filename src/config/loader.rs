//! Load declarations from a project directory:
//! `common/models/*.json`, `server/model-config.json`, `server/datasources[.{env}].json`.

use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::path::Path;

fn read_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    tracing::debug!(path = %path.display(), "loading config file");
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Read every `*.json` model declaration in `dir`, sorted by file name. Other files are skipped.
pub fn load_model_declarations(dir: &Path) -> Result<Vec<ModelConfig>, ConfigError> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| ConfigError::Load(format!("error while loading models from {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        out.push(read_json::<ModelConfig>(&path)?);
    }
    Ok(out)
}

pub fn load_model_config(path: &Path) -> Result<GlobalModelConfig, ConfigError> {
    read_json(path)
        .map_err(|e| ConfigError::Load(format!("missing or invalid model-config.json: {}", e)))
}

/// Read `datasources.{env}.json` when `env` is set, falling back to `datasources.json`.
pub fn load_datasources(
    server_dir: &Path,
    env: Option<&str>,
) -> Result<BTreeMap<String, DatasourceConfig>, ConfigError> {
    if let Some(env) = env {
        let env_file = server_dir.join(format!("datasources.{}.json", env));
        if env_file.exists() {
            return read_json(&env_file);
        }
        tracing::warn!(
            "{} not found, fallback to datasources.json",
            env_file.display()
        );
    }
    read_json(&server_dir.join("datasources.json"))
}

/// Load and validate a whole project rooted at `root`.
pub fn load_project(root: &Path, env: Option<&str>) -> Result<ProjectConfig, ConfigError> {
    let models = load_model_declarations(&root.join("common").join("models"))?;
    let server_dir = root.join("server");
    let model_config = load_model_config(&server_dir.join("model-config.json"))?;
    let datasources = load_datasources(&server_dir, env)?;
    let config = ProjectConfig {
        models,
        model_config,
        datasources,
    };
    validate(&config)?;
    Ok(config)
}
