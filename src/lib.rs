//! Modelstack: model-driven backend runtime. Declared models, relations and access
//! policies become a live object graph served through an event-hook pipeline.

pub mod auth;
pub mod behaviors;
pub mod bootstrap;
pub mod case;
pub mod config;
pub mod datasource;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod model;
pub mod policy;
pub mod routes;
pub mod state;
pub mod value;

pub use auth::{BearerToken, Claims, JwtSigner, SecretHasher, TokenSigner};
pub use bootstrap::{Runtime, RuntimeBuilder};
pub use config::{BaseModel, ModelConfig, Relation, RelationType, Settings};
pub use datasource::{Datasource, Filter, MemoryDatasource, PostgresDatasource};
pub use error::{AppError, ConfigError};
pub use model::{EventContext, EventHandler, Instance, Model, ModelRegistry, UpdateInput};
pub use routes::{common_routes, model_routes};
pub use state::AppState;
pub use value::{ObjectId, Value, M};
