//! Compiles a model's ACL strings (`subject,object,action,effect`) and grammar overrides
//! into a policy model: request, policy, role, effect and matcher sections plus rows.
//!
//! Overrides of the effect and matcher sections may contain `$default`, replaced by the
//! computed default (the default matcher is wrapped in parentheses). The reserved subjects
//! `$owner`, `$authenticated` and `$everyone` are rewritten to `_owner`, `_authenticated`
//! and `_everyone` everywhere.

use crate::config::{BaseModel, ModelConfig};
use crate::error::ConfigError;
use std::fmt;

pub const DEFAULT_REQUEST_DEFINITION: &str = "sub, obj, act";
pub const DEFAULT_POLICY_DEFINITION: &str = "sub, obj, act, eft";
pub const DEFAULT_ROLE_DEFINITION: &str = "_, _";
pub const DEFAULT_POLICY_EFFECT: &str = "subjectPriority(p.eft) || deny";
pub const DEFAULT_MATCHER: &str = "((p.sub == '$owner' && isOwner(r.sub, r.obj, p.obj)) || g(r.sub, p.sub)) && keyMatch(r.obj, p.obj) && (g(r.act, p.act) || keyMatch(r.act, p.act))";

pub const DEFAULT_PLACEHOLDER: &str = "$default";

pub const OWNER: &str = "_owner";
pub const AUTHENTICATED: &str = "_authenticated";
pub const EVERYONE: &str = "_everyone";

const DEFAULT_POLICIES: [&str; 2] = ["$authenticated,*,read,allow", "$owner,*,write,allow"];

const USER_POLICIES: [&str; 4] = [
    "$everyone,*,create,allow",
    "$everyone,*,login,allow",
    "$owner,*,*,allow",
    "$authenticated,*,findSelf,allow",
];

pub fn replace_var_names(s: &str) -> String {
    s.replace("$owner", OWNER)
        .replace("$authenticated", AUTHENTICATED)
        .replace("$everyone", EVERYONE)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub action: String,
    pub effect: Effect,
}

impl PolicyRule {
    /// Parse `subject,object,action,effect`. Reserved names are rewritten in every field.
    pub fn parse(raw: &str) -> Option<PolicyRule> {
        let raw = replace_var_names(raw);
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 4 || parts[..3].iter().any(|p| p.is_empty()) {
            return None;
        }
        let effect = match parts[3].to_lowercase().as_str() {
            "allow" => Effect::Allow,
            "deny" => Effect::Deny,
            _ => return None,
        };
        Some(PolicyRule {
            subject: parts[0].to_string(),
            object: parts[1].to_string(),
            action: parts[2].to_string(),
            effect,
        })
    }
}

impl fmt::Display for PolicyRule {
    /// Policy store row.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p, {}, {}, {}, {}",
            self.subject,
            self.object,
            self.action,
            self.effect.as_str()
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledPolicy {
    pub model: String,
    pub request_definition: String,
    pub policy_definition: String,
    pub role_definition: String,
    pub policy_effect: String,
    pub matchers: String,
    pub rules: Vec<PolicyRule>,
}

impl CompiledPolicy {
    /// True when the matcher is exactly the default one.
    pub fn uses_default_matcher(&self) -> bool {
        self.matchers == replace_var_names(DEFAULT_MATCHER)
    }

    /// Model definition text, one `[section]` per grammar part.
    pub fn model_conf(&self) -> String {
        format!(
            "[request_definition]\nr = {}\n\n[policy_definition]\np = {}\n\n[role_definition]\ng = {}\n\n[policy_effect]\ne = {}\n\n[matchers]\nm = {}\n",
            self.request_definition,
            self.policy_definition,
            self.role_definition,
            self.policy_effect,
            self.matchers
        )
    }

    /// Policy store contents, one row per rule.
    pub fn policy_csv(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str(&rule.to_string());
            out.push('\n');
        }
        out
    }
}

fn with_default(override_: Option<&str>, default: &str, wrap: bool) -> String {
    match override_ {
        Some(o) if !o.trim().is_empty() => {
            let replacement = if wrap {
                format!(" ( {} ) ", default)
            } else {
                default.to_string()
            };
            o.replace(DEFAULT_PLACEHOLDER, &replacement)
        }
        _ => default.to_string(),
    }
}

fn or_default(override_: Option<&str>, default: &str) -> String {
    match override_ {
        Some(o) if !o.trim().is_empty() => o.to_string(),
        _ => default.to_string(),
    }
}

pub fn compile(config: &ModelConfig) -> Result<CompiledPolicy, ConfigError> {
    let casbin = &config.casbin;
    let declared: Vec<&str> = if casbin.policies.is_empty() {
        DEFAULT_POLICIES.to_vec()
    } else {
        casbin.policies.iter().map(String::as_str).collect()
    };
    let extra: &[&str] = if config.base == BaseModel::User {
        &USER_POLICIES
    } else {
        &[]
    };

    let mut rules = Vec::new();
    for raw in declared.iter().chain(extra.iter()) {
        let rule = PolicyRule::parse(raw).ok_or_else(|| ConfigError::InvalidPolicy {
            model: config.name.clone(),
            policy: raw.to_string(),
        })?;
        rules.push(rule);
    }

    let matchers = with_default(casbin.matchers_definition.as_deref(), DEFAULT_MATCHER, true);
    let compiled = CompiledPolicy {
        model: config.name.clone(),
        request_definition: replace_var_names(&or_default(
            casbin.request_definition.as_deref(),
            DEFAULT_REQUEST_DEFINITION,
        )),
        policy_definition: replace_var_names(&or_default(
            casbin.policy_definition.as_deref(),
            DEFAULT_POLICY_DEFINITION,
        )),
        role_definition: replace_var_names(&or_default(
            casbin.role_definition.as_deref(),
            DEFAULT_ROLE_DEFINITION,
        )),
        policy_effect: replace_var_names(&with_default(
            casbin.policy_effect.as_deref(),
            DEFAULT_POLICY_EFFECT,
            false,
        )),
        matchers: replace_var_names(&matchers),
        rules,
    };
    tracing::debug!(model = %config.name, rules = compiled.rules.len(), "policy compiled");
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_plain_model() {
        let p = compile(&ModelConfig::new("Note", BaseModel::PersistedModel)).unwrap();
        assert_eq!(
            p.policy_csv(),
            "p, _authenticated, *, read, allow\np, _owner, *, write, allow\n"
        );
        assert_eq!(p.request_definition, DEFAULT_REQUEST_DEFINITION);
        assert_eq!(p.role_definition, "_, _");
        assert_eq!(p.policy_effect, DEFAULT_POLICY_EFFECT);
        assert!(p.matchers.starts_with("((p.sub == '_owner' && isOwner"));
        assert!(p.uses_default_matcher());
    }

    #[test]
    fn user_models_get_four_extra_rows() {
        let p = compile(&ModelConfig::new("Account", BaseModel::User)).unwrap();
        let rows: Vec<String> = p.rules.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            rows,
            vec![
                "p, _authenticated, *, read, allow",
                "p, _owner, *, write, allow",
                "p, _everyone, *, create, allow",
                "p, _everyone, *, login, allow",
                "p, _owner, *, *, allow",
                "p, _authenticated, *, findSelf, allow",
            ]
        );
    }

    #[test]
    fn declared_policies_replace_defaults() {
        let cfg = ModelConfig::new("Note", BaseModel::PersistedModel)
            .with_policies(&["$everyone,*,findMany,allow", "admin, *, *, DENY"]);
        let p = compile(&cfg).unwrap();
        assert_eq!(p.rules.len(), 2);
        assert_eq!(p.rules[0].subject, EVERYONE);
        assert_eq!(p.rules[1].subject, "admin");
        assert_eq!(p.rules[1].effect, Effect::Deny);
    }

    #[test]
    fn default_placeholder_extends_matcher() {
        let mut cfg = ModelConfig::new("Note", BaseModel::PersistedModel);
        cfg.casbin.matchers_definition = Some("$default || r.sub == 'root'".into());
        cfg.casbin.policy_effect = Some("$default".into());
        cfg.casbin.request_definition = Some("sub, obj, act, ctx".into());
        let p = compile(&cfg).unwrap();
        assert!(p.matchers.starts_with(" ( ((p.sub == '_owner'"));
        assert!(p.matchers.ends_with(" )  || r.sub == 'root'"));
        assert_eq!(p.policy_effect, DEFAULT_POLICY_EFFECT);
        assert_eq!(p.request_definition, "sub, obj, act, ctx");
        assert!(!p.uses_default_matcher());
        assert!(p.model_conf().contains("[matchers]\nm =  ( "));
    }

    #[test]
    fn reserved_names_are_rewritten_in_every_section() {
        let mut cfg = ModelConfig::new("Note", BaseModel::PersistedModel)
            .with_policies(&["admin,$owner*,$everyone,allow"]);
        cfg.casbin.request_definition = Some("sub, obj, act, $owner".into());
        cfg.casbin.policy_definition = Some("sub, obj, act, eft, $authenticated".into());
        cfg.casbin.role_definition = Some("_, _, $everyone".into());
        cfg.casbin.policy_effect = Some("$default && $owner".into());
        let p = compile(&cfg).unwrap();
        assert_eq!(p.request_definition, "sub, obj, act, _owner");
        assert_eq!(p.policy_definition, "sub, obj, act, eft, _authenticated");
        assert_eq!(p.role_definition, "_, _, _everyone");
        assert_eq!(p.policy_effect, format!("{} && _owner", DEFAULT_POLICY_EFFECT));
        assert_eq!(p.rules[0].object, "_owner*");
        assert_eq!(p.rules[0].action, "_everyone");
        assert!(!p.model_conf().contains('$'));
    }

    #[test]
    fn malformed_policy_is_rejected() {
        let cfg = ModelConfig::new("Note", BaseModel::PersistedModel).with_policies(&["$owner,*,read"]);
        assert!(matches!(compile(&cfg), Err(ConfigError::InvalidPolicy { .. })));
        assert!(PolicyRule::parse("a,b,c,maybe").is_none());
        assert!(PolicyRule::parse("a,b,c,allow,x").is_none());
    }

    #[test]
    fn var_names() {
        assert_eq!(replace_var_names("$owner|$authenticated|$everyone"), "_owner|_authenticated|_everyone");
    }
}
