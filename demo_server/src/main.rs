//! Demo server.
//!
//! With `MODELSTACK_PROJECT_DIR` set, models and datasources are loaded from that directory
//! (`common/models/*.json`, `server/model-config.json`, `server/datasources.json`).
//! Otherwise a User/Role/Note schema runs on an in-memory datasource.
//!
//! Run from repo root: `cargo run -p demo-server`

use modelstack::{
    common_routes, model_routes, AppState, BaseModel, MemoryDatasource, ModelConfig, Relation,
    RelationType, Runtime, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

fn demo_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("User", BaseModel::User)
            .with_hidden(&["password"])
            .with_relation("notes", Relation::new(RelationType::HasMany, "Note")),
        ModelConfig::new("Role", BaseModel::Role).with_policies(&["$authenticated,*,read,allow"]),
        ModelConfig::new("Note", BaseModel::PersistedModel)
            .with_relation("owner", Relation::new(RelationType::BelongsTo, "User").with_foreign_key("userId"))
            .with_policies(&[
                "$authenticated,*,read,allow",
                "$authenticated,*,create,allow",
                "$owner,*,write,allow",
            ]),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("modelstack=info")),
        )
        .init();

    let settings = Settings::from_env();
    let runtime = match std::env::var("MODELSTACK_PROJECT_DIR") {
        Ok(dir) => Runtime::from_project_dir(&PathBuf::from(dir), settings).await?,
        Err(_) => {
            let mut builder = Runtime::builder(settings).datasource("db", Arc::new(MemoryDatasource::new("db")));
            for model in demo_models() {
                builder = builder.model(model);
            }
            builder.build()?
        }
    };
    let state = AppState::new(runtime);

    let app = common_routes().merge(model_routes(state));
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("demo server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
