use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::str::FromStr;

use crate::error::Result;
use crate::models::AnalysisKind;

/// Open the SQLite pool. In-memory databases get a single connection that is
/// never recycled, otherwise every pooled connection would see its own empty
/// database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    if !in_memory {
        // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
        let file_path = database_url
            .strip_prefix("sqlite:///")
            .or_else(|| database_url.strip_prefix("sqlite://"))
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };

    Ok(pool)
}

/// Create the three cache tables if they do not exist yet.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            match_id   INTEGER NOT NULL,
            kind       TEXT NOT NULL,
            value      TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (match_id, kind)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fixtures (
            date       TEXT PRIMARY KEY,
            fixtures   TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pedidos (
            preference_id   TEXT PRIMARY KEY,
            type            TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            acesso_liberado INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

// Prediction cache operations

pub async fn get_prediction(pool: &SqlitePool, match_id: i64, kind: AnalysisKind) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT value FROM predictions WHERE match_id = ? AND kind = ?",
    )
    .bind(match_id)
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(value)
}

/// Store an artifact. Cached analyses are immutable: when a value already
/// exists for (match, kind) the write is ignored and `false` is returned.
pub async fn put_prediction(pool: &SqlitePool, match_id: i64, kind: AnalysisKind, value: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO predictions (match_id, kind, value, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (match_id, kind) DO NOTHING
        "#,
    )
    .bind(match_id)
    .bind(kind.as_str())
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Drop cached artifacts for a match so they can be regenerated; all kinds when `kind` is None.
pub async fn invalidate_predictions(pool: &SqlitePool, match_id: i64, kind: Option<AnalysisKind>) -> Result<u64> {
    let result = match kind {
        Some(kind) => {
            sqlx::query("DELETE FROM predictions WHERE match_id = ? AND kind = ?")
                .bind(match_id)
                .bind(kind.as_str())
                .execute(pool)
                .await?
        }
        None => {
            sqlx::query("DELETE FROM predictions WHERE match_id = ?")
                .bind(match_id)
                .execute(pool)
                .await?
        }
    };

    Ok(result.rows_affected())
}

pub async fn get_cached_predictions(pool: &SqlitePool, match_id: i64) -> Result<Vec<(AnalysisKind, String)>> {
    let rows = sqlx::query("SELECT kind, value FROM predictions WHERE match_id = ? ORDER BY created_at")
        .bind(match_id)
        .fetch_all(pool)
        .await?;

    let mut cached = Vec::new();
    for row in rows {
        let kind: String = row.get("kind");
        match kind.parse::<AnalysisKind>() {
            Ok(kind) => cached.push((kind, row.get("value"))),
            Err(e) => tracing::warn!("Skipping cached row for match {}: {}", match_id, e),
        }
    }
    Ok(cached)
}

// Fixture listing operations

pub async fn get_fixtures_for_date(pool: &SqlitePool, date: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT fixtures FROM fixtures WHERE date = ?")
        .bind(date)
        .fetch_optional(pool)
        .await?;

    Ok(value)
}

pub async fn put_fixtures_for_date(pool: &SqlitePool, date: &str, fixtures: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO fixtures (date, fixtures, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT (date) DO UPDATE SET
            fixtures   = excluded.fixtures,
            created_at = excluded.created_at
        "#,
    )
    .bind(date)
    .bind(fixtures)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove every cached fixture listing. Returns the number of dates cleared.
pub async fn reset_fixtures(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM fixtures").execute(pool).await?;
    tracing::info!("Fixture cache cleared ({} dates)", result.rows_affected());
    Ok(result.rows_affected())
}

// Order operations

pub async fn insert_order(pool: &SqlitePool, preference_id: &str, product: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO pedidos (preference_id, type, created_at) VALUES (?, ?, ?)")
        .bind(preference_id)
        .bind(product)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn grant_order_access(pool: &SqlitePool, preference_id: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE pedidos SET acesso_liberado = 1 WHERE preference_id = ?")
        .bind(preference_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether the order has been paid. Unknown preferences have no access.
pub async fn order_access(pool: &SqlitePool, preference_id: &str) -> Result<bool> {
    let granted = sqlx::query_scalar::<_, i64>("SELECT acesso_liberado FROM pedidos WHERE preference_id = ?")
        .bind(preference_id)
        .fetch_optional(pool)
        .await?;

    Ok(granted.unwrap_or(0) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        init_database_with_pool(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_prediction_is_write_once() {
        let pool = test_pool().await;

        assert!(put_prediction(&pool, 42, AnalysisKind::Analysis, "first").await.unwrap());
        assert!(!put_prediction(&pool, 42, AnalysisKind::Analysis, "second").await.unwrap());

        let cached = get_prediction(&pool, 42, AnalysisKind::Analysis).await.unwrap();
        assert_eq!(cached.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let pool = test_pool().await;

        put_prediction(&pool, 42, AnalysisKind::StatisticsHome, "{\"home\":1}").await.unwrap();
        assert!(get_prediction(&pool, 42, AnalysisKind::StatisticsAway).await.unwrap().is_none());
        assert!(get_prediction(&pool, 43, AnalysisKind::StatisticsHome).await.unwrap().is_none());

        put_prediction(&pool, 42, AnalysisKind::QuickPick, "Over 1.5").await.unwrap();
        let all = get_cached_predictions(&pool, 42).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_allows_regeneration() {
        let pool = test_pool().await;

        put_prediction(&pool, 7, AnalysisKind::Analysis, "old").await.unwrap();
        put_prediction(&pool, 7, AnalysisKind::QuickPick, "pick").await.unwrap();

        assert_eq!(invalidate_predictions(&pool, 7, Some(AnalysisKind::Analysis)).await.unwrap(), 1);
        assert!(put_prediction(&pool, 7, AnalysisKind::Analysis, "new").await.unwrap());
        assert_eq!(get_prediction(&pool, 7, AnalysisKind::Analysis).await.unwrap().as_deref(), Some("new"));

        assert_eq!(invalidate_predictions(&pool, 7, None).await.unwrap(), 2);
        assert!(get_cached_predictions(&pool, 7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixture_cache_and_reset() {
        let pool = test_pool().await;

        put_fixtures_for_date(&pool, "2025-05-01", "{\"response\":[]}").await.unwrap();
        put_fixtures_for_date(&pool, "2025-05-01", "{\"response\":[1]}").await.unwrap();
        put_fixtures_for_date(&pool, "2025-05-02", "{\"response\":[]}").await.unwrap();

        let cached = get_fixtures_for_date(&pool, "2025-05-01").await.unwrap();
        assert_eq!(cached.as_deref(), Some("{\"response\":[1]}"));

        assert_eq!(reset_fixtures(&pool).await.unwrap(), 2);
        assert!(get_fixtures_for_date(&pool, "2025-05-01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_order_access_flow() {
        let pool = test_pool().await;

        insert_order(&pool, "pref-1", "vip").await.unwrap();
        assert!(!order_access(&pool, "pref-1").await.unwrap());

        assert!(grant_order_access(&pool, "pref-1").await.unwrap());
        assert!(order_access(&pool, "pref-1").await.unwrap());

        assert!(!grant_order_access(&pool, "unknown").await.unwrap());
        assert!(!order_access(&pool, "unknown").await.unwrap());
    }
}
