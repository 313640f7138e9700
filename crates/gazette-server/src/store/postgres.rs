//! PostgreSQL newsletter storage.

use std::fmt;

use gazette_relay::PgChangeSource;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use super::trigger::TriggerSpec;
use super::{NewNewsletter, Newsletter, StoreError, NEWSLETTER_COLUMNS, NEWSLETTER_TABLE};
use crate::config::ServerConfig;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS newsletters (
        id SERIAL PRIMARY KEY,
        title VARCHAR NOT NULL,
        content TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_newsletters_title ON newsletters (title)",
];

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
    database_url: String,
    trigger: TriggerSpec,
}

impl PgStore {
    /// Connect a pool using the configured limits.
    pub async fn connect(config: &ServerConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_connections)
            .acquire_timeout(config.pool_acquire_timeout)
            .connect(&config.database_url)
            .await?;

        info!(
            max_connections = config.pool_max_connections,
            "connected to PostgreSQL"
        );

        Ok(Self {
            pool,
            database_url: config.database_url.clone(),
            trigger: TriggerSpec::new(NEWSLETTER_TABLE, NEWSLETTER_COLUMNS)?,
        })
    }

    /// Create the table if needed and (re)install the notification trigger.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        for statement in self.trigger.install_statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }

        info!(
            table = self.trigger.table(),
            channel = %self.trigger.channel(),
            "schema ready"
        );
        Ok(())
    }

    pub async fn create(&self, new: &NewNewsletter) -> Result<Newsletter, StoreError> {
        let row = sqlx::query_as::<_, Newsletter>(
            "INSERT INTO newsletters (title, content) VALUES ($1, $2) \
             RETURNING id, title, content, created_at",
        )
        .bind(&new.title)
        .bind(&new.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list(&self) -> Result<Vec<Newsletter>, StoreError> {
        let rows = sqlx::query_as::<_, Newsletter>(
            "SELECT id, title, content, created_at FROM newsletters \
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update(
        &self,
        id: i32,
        changes: &NewNewsletter,
    ) -> Result<Option<Newsletter>, StoreError> {
        let row = sqlx::query_as::<_, Newsletter>(
            "UPDATE newsletters SET title = $1, content = $2 WHERE id = $3 \
             RETURNING id, title, content, created_at",
        )
        .bind(&changes.title)
        .bind(&changes.content)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// An unopened `LISTEN` source on the trigger's channel.
    pub fn change_source(&self) -> PgChangeSource {
        PgChangeSource::new(&self.database_url, self.trigger.channel())
    }
}

impl fmt::Debug for PgStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStore")
            .field("table", &self.trigger.table())
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
