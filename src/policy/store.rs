//! Policy files: `{dir}/{Model}.policies.csv` and `{dir}/{Model}.model.conf`, rewritten
//! wholesale at bootstrap.

use crate::error::ConfigError;
use crate::policy::{CompiledPolicy, Effect, PolicyRule};
use std::fs;
use std::path::{Path, PathBuf};

pub fn policy_file(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("{}.policies.csv", model))
}

pub fn model_conf_file(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("{}.model.conf", model))
}

/// Write both files for one model, creating `dir` when missing.
pub fn save(policy: &CompiledPolicy, dir: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(dir)?;
    fs::write(policy_file(dir, &policy.model), policy.policy_csv())?;
    fs::write(model_conf_file(dir, &policy.model), policy.model_conf())?;
    tracing::debug!(model = %policy.model, dir = %dir.display(), "policy files written");
    Ok(())
}

/// Read back a policy store file. Rows other than `p, sub, obj, act, eft` are skipped.
pub fn load_rules(path: &Path) -> Result<Vec<PolicyRule>, ConfigError> {
    let text = fs::read_to_string(path)?;
    let mut rules = Vec::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() != 5 || parts[0] != "p" {
            continue;
        }
        let effect = match parts[4] {
            "allow" => Effect::Allow,
            "deny" => Effect::Deny,
            _ => continue,
        };
        rules.push(PolicyRule {
            subject: parts[1].to_string(),
            object: parts[2].to_string(),
            action: parts[3].to_string(),
            effect,
        });
    }
    Ok(rules)
}
