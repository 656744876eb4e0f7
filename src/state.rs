use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{auth::jwt::JwtKeys, config::AppConfig};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let db = connect_pool(&config.database_url).await?;
        Ok(Self::from_parts(db, config))
    }

    pub fn from_parts(db: SqlitePool, config: AppConfig) -> Self {
        let keys = JwtKeys::from(&config.jwt);
        Self {
            db,
            config: Arc::new(config),
            keys,
        }
    }

    /// State over a fresh migrated in-memory database.
    #[cfg(test)]
    pub async fn fake() -> Self {
        Self::from_parts(test_pool().await, test_config("sqlite::memory:"))
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

pub(crate) fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// An in-memory database only exists inside the connection that opened it, so
/// it gets a pool of exactly one connection that is never recycled.
pub async fn connect_pool(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .context("parse DATABASE_URL")?
        .create_if_missing(true);
    let pool = if is_in_memory(url) {
        SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };
    pool.connect_with(options)
        .await
        .context("connect to database")
}

#[cfg(test)]
fn test_config(database_url: &str) -> AppConfig {
    AppConfig::new(
        database_url.into(),
        crate::config::JwtConfig::new("test-secret".into(), "HS256", 30).expect("jwt config"),
    )
    .expect("app config")
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let db = connect_pool("sqlite::memory:").await.expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("migrations apply");
    db
}

/// Migrated database file in the temp dir behind a multi-connection pool.
/// The files are removed on drop.
#[cfg(test)]
pub struct TempDb {
    pub state: AppState,
    path: std::path::PathBuf,
}

#[cfg(test)]
impl TempDb {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!(
            "user-registry-{}.db",
            rand::random::<u64>()
        ));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = connect_pool(&url).await.expect("file sqlite");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("migrations apply");
        Self {
            state: AppState::from_parts(db, test_config(&url)),
            path,
        }
    }
}

#[cfg(test)]
impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:db?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://data/app.db?mode=rwc"));
    }

    #[tokio::test]
    async fn in_memory_pool_serves_every_checkout_from_one_database() {
        let db = test_pool().await;
        assert_eq!(db.options().get_max_connections(), 1);

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                    .fetch_one(&db)
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().expect("users table visible"), 0);
        }
    }

    #[tokio::test]
    async fn file_pool_allows_several_connections() {
        let tmp = TempDb::new().await;
        assert_eq!(tmp.state.db.options().get_max_connections(), 10);
        let a = tmp.state.db.acquire().await.unwrap();
        let b = tmp.state.db.acquire().await.unwrap();
        drop((a, b));
    }
}
