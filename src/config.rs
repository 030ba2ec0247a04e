use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::{LeaderboardError, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://learnboard.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    /// Fraction of `max_score` a quiz needs to count as a correct answer.
    pub pass_ratio: f64,
    pub leaderboard_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            pass_ratio: 0.8,
            leaderboard_limit: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let busy_timeout_ms: u64 = parse_var(
            &lookup,
            "LEARNBOARD_BUSY_TIMEOUT_MS",
            defaults.busy_timeout.as_millis() as u64,
        )?;

        let pass_ratio: f64 = parse_var(&lookup, "LEARNBOARD_PASS_RATIO", defaults.pass_ratio)?;
        if !(0.0..=1.0).contains(&pass_ratio) {
            return Err(LeaderboardError::Config {
                var: "LEARNBOARD_PASS_RATIO",
                reason: format!("{pass_ratio} is outside 0.0..=1.0"),
            });
        }

        let max_connections: u32 =
            parse_var(&lookup, "LEARNBOARD_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(LeaderboardError::Config {
                var: "LEARNBOARD_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            pass_ratio,
            leaderboard_limit: parse_var(
                &lookup,
                "LEARNBOARD_LEADERBOARD_LIMIT",
                defaults.leaderboard_limit,
            )?,
        })
    }

    /// Opens the pool and brings the schema up to date.
    pub async fn connect(&self) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.busy_timeout)
            .connect_with(options)
            .await?;

        crate::db::init_db(&pool).await?;
        info!(database_url = %self.database_url, "database ready");
        Ok(pool)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| LeaderboardError::Config {
            var,
            reason: format!("{raw:?}: {err}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.busy_timeout, Duration::from_millis(5000));
        assert_eq!(config.pass_ratio, 0.8);
        assert_eq!(config.leaderboard_limit, 50);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("LEARNBOARD_PASS_RATIO", "0.7"),
            ("LEARNBOARD_BUSY_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.pass_ratio, 0.7);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = Config::from_lookup(lookup_from(&[("LEARNBOARD_MAX_CONNECTIONS", "many")]))
            .unwrap_err();
        assert!(matches!(
            err,
            LeaderboardError::Config { var: "LEARNBOARD_MAX_CONNECTIONS", .. }
        ));

        let err = Config::from_lookup(lookup_from(&[("LEARNBOARD_PASS_RATIO", "1.5")])).unwrap_err();
        assert!(matches!(err, LeaderboardError::Config { var: "LEARNBOARD_PASS_RATIO", .. }));
    }
}
