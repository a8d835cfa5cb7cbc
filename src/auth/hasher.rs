use crate::error::AppError;
use std::sync::Arc;

/// One-way secret hashing.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, AppError>;
    fn verify(&self, secret: &str, hash: &str) -> Result<bool, AppError>;
}

#[derive(Clone, Debug)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        BcryptHasher { cost }
    }
}

impl SecretHasher for BcryptHasher {
    fn hash(&self, secret: &str) -> Result<String, AppError> {
        Ok(bcrypt::hash(secret, self.cost)?)
    }

    fn verify(&self, secret: &str, hash: &str) -> Result<bool, AppError> {
        Ok(bcrypt::verify(secret, hash)?)
    }
}

/// [`SecretHasher::hash`] on the blocking pool; bcrypt is CPU-bound.
pub async fn hash_blocking(hasher: &Arc<dyn SecretHasher>, secret: String) -> Result<String, AppError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.hash(&secret)).await?
}

/// [`SecretHasher::verify`] on the blocking pool.
pub async fn verify_blocking(
    hasher: &Arc<dyn SecretHasher>,
    secret: String,
    hash: String,
) -> Result<bool, AppError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let h = BcryptHasher::new(4);
        let hash = h.hash("s3cret").unwrap();
        assert_ne!(hash, "s3cret");
        assert!(h.verify("s3cret", &hash).unwrap());
        assert!(!h.verify("other", &hash).unwrap());
        assert!(h.verify("s3cret", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn blocking_helpers_round_trip() {
        let h: Arc<dyn SecretHasher> = Arc::new(BcryptHasher::new(4));
        let hash = hash_blocking(&h, "s3cret".into()).await.unwrap();
        assert!(verify_blocking(&h, "s3cret".into(), hash.clone()).await.unwrap());
        assert!(!verify_blocking(&h, "nope".into(), hash).await.unwrap());
    }
}
