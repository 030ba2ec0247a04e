use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;
use crate::ledger;
use crate::models::ActivityKind;

pub async fn init_db(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    user_id: String,
    username: Option<String>,
    email: Option<String>,
    activity_kind: String,
    points: i64,
    #[serde(default)]
    detail: String,
}

/// Loads ledger events from CSV. Each row is recorded through the ledger so
/// aggregates stay consistent; the first bad row aborts the import.
pub async fn import_csv(pool: &SqlitePool, csv_path: &std::path::Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let mut tx = pool.begin().await?;

        ledger::ensure_user(
            &mut tx,
            &row.user_id,
            row.username.as_deref().filter(|name| !name.trim().is_empty()),
            row.email.as_deref().filter(|email| !email.trim().is_empty()),
        )
        .await?;
        ledger::record_event_in(
            &mut tx,
            &row.user_id,
            &ActivityKind::from(row.activity_kind),
            row.points,
            &row.detail,
        )
        .await?;

        tx.commit().await?;
        inserted += 1;
    }

    info!(inserted, path = %csv_path.display(), "imported ledger events");
    Ok(inserted)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_db(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = test_pool().await;
        init_db(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name != 'sqlite_sequence' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec!["achievements", "leaderboard_stats", "score_events", "users"]
        );
    }

    #[tokio::test]
    async fn import_records_each_row_through_the_ledger() {
        let pool = test_pool().await;
        let path = std::env::temp_dir().join(format!("learnboard-import-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "user_id,username,email,activity_kind,points,detail\n\
             user_001,Alex Johnson,alex@example.com,pdf_processed,25,lecture notes\n\
             user_001,,,quiz_completed,20,\n\
             user_002,Sarah Chen,,url_processed,30,article\n",
        )
        .unwrap();

        let inserted = import_csv(&pool, &path).await.unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(inserted, 3);

        assert_eq!(ledger::ledger_total(&pool, "user_001").await.unwrap(), 45);
        let stats = ledger::fetch_stats(&pool, "user_001").await.unwrap().unwrap();
        assert_eq!(stats.points, 45);

        let user = ledger::fetch_user(&pool, "user_001").await.unwrap().unwrap();
        assert_eq!(user.username, "Alex Johnson");
        assert_eq!(user.email.as_deref(), Some("alex@example.com"));
    }
}
