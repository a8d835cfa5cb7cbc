//! Access policies: compilation, policy files and in-process enforcement.

pub mod compiler;
pub mod enforcer;
pub mod store;

pub use compiler::{
    compile, replace_var_names, CompiledPolicy, Effect, PolicyRule, AUTHENTICATED, EVERYONE, OWNER,
};
pub use enforcer::{AccessRequest, Enforcer, OwnerLookup, RecordOwnerLookup};
