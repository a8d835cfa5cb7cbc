//! Process settings from environment variables (loaded from `.env` by the binary via dotenvy).

use std::path::PathBuf;

/// Default bcrypt cost for stored secrets.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Token lifetime in milliseconds: two weeks.
pub const DEFAULT_TOKEN_TTL_MS: i64 = 604_800 * 2 * 1000;

#[derive(Clone, Debug)]
pub struct Settings {
    /// HMAC secret for signed claims (`JWT_SECRET`).
    pub jwt_secret: String,
    /// Directory receiving `{Model}.policies.csv` and `{Model}.model.conf` (`POLICIES_OUTPUT_DIR`).
    pub policies_output_dir: PathBuf,
    /// Prefix for model routes (`REST_API_ROOT`).
    pub rest_api_root: String,
    pub bcrypt_cost: u32,
    pub token_ttl_ms: i64,
    /// Selects `datasources.{env}.json` (`APP_ENV`).
    pub env: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            jwt_secret: "change-me".into(),
            policies_output_dir: PathBuf::from("./data/policies"),
            rest_api_root: "/api/v1".into(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            token_ttl_ms: DEFAULT_TOKEN_TTL_MS,
            env: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using an insecure default");
            defaults.jwt_secret.clone()
        });
        Settings {
            jwt_secret,
            policies_output_dir: std::env::var("POLICIES_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.policies_output_dir),
            rest_api_root: std::env::var("REST_API_ROOT").unwrap_or(defaults.rest_api_root),
            bcrypt_cost: std::env::var("BCRYPT_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bcrypt_cost),
            token_ttl_ms: defaults.token_ttl_ms,
            env: std::env::var("APP_ENV").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn with_policies_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.policies_output_dir = dir.into();
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}
