//! Principals, one-way secret hashing, signed claims and the login flow.

pub mod bearer;
pub mod hasher;
pub mod login;
pub mod token;

pub use bearer::{BearerRole, BearerToken, BearerUser};
pub use hasher::{hash_blocking, verify_blocking, BcryptHasher, SecretHasher};
pub use login::{find_user_roles, LoginHandler, DEFAULT_ROLE, ROLE_MAPPING_MODEL};
pub use token::{Claims, JwtSigner, TokenSigner};
