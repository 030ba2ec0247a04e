use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaderboardError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid configuration for {var}: {reason}")]
    Config { var: &'static str, reason: String },

    #[error("import failed: {0}")]
    Import(#[from] csv::Error),
}

impl LeaderboardError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LeaderboardError>;

/// Rejects blank identifiers before any storage work happens.
pub fn require_user_id(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(LeaderboardError::validation("user_id is required"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_id_is_a_validation_error() {
        assert!(matches!(
            require_user_id("   "),
            Err(LeaderboardError::Validation(_))
        ));
        assert_eq!(require_user_id(" user_001 ").unwrap(), "user_001");
    }
}
