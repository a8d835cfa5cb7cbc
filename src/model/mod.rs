//! Models, their registry, relations, instances and the event pipeline.

mod context;
mod definition;
mod instance;
mod operations;
pub mod pipeline;
mod registry;
pub mod relation;

pub use context::{EventContext, Frame, RequestScope};
pub use definition::Model;
pub use instance::{Instance, InstanceList, Related, RelatedRef, UpdateInput};
pub use operations::BoxFuture;
pub use pipeline::{handler_fn, EventHandler, HandlerFn};
pub use registry::{ModelDraft, ModelRegistry, ModelRegistryBuilder};
pub use relation::resolve_relations;
