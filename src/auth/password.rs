use crate::error::{AppError, AppResult};

/// Hash a password with bcrypt on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("hash password: {}", e)))
}

/// Constant-time check of `password` against a stored bcrypt hash.
/// A malformed hash verifies as false.
pub async fn verify_password(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("correct horse".into(), 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("correct horse".into(), hash.clone()).await);
        assert!(!verify_password("wrong".into(), hash).await);
    }

    #[tokio::test]
    async fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything".into(), "not-a-hash".into()).await);
    }
}
