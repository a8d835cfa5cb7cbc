//! Built-in behaviors attached to models at bootstrap.

pub mod crud;
pub mod role;
pub mod timestamps;
pub mod user;

pub use crud::{register_crud, Crud};
pub use role::role_mapping_config;
pub use timestamps::register_timestamps;
pub use user::UserBeforeSave;
