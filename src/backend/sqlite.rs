use std::str::FromStr;

use sqlx::FromRow;
use tracing::error;

use crate::product::{ProductEntity, ProductId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(sqlx::Error),
    #[error("failed to decode stored product {id}: {error}")]
    Decode {
        id: String,
        error: serde_json::Error,
    },
    #[error("failed to encode product {id}: {error}")]
    Encode {
        id: String,
        error: serde_json::Error,
    },
}

/// Products kept as JSON documents in a SQLite table.
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(url)
            .inspect_err(|error| error!(%error, %url, "Failed to open product db"))?
            .create_if_missing(true);
        let pool = sqlx::pool::PoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .inspect_err(|error| error!(%error, %url, "Failed to open product db"))?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products(
                id TEXT NOT NULL PRIMARY KEY,
                code TEXT NOT NULL,
                body TEXT NOT NULL,
                message TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )
        .execute(&pool)
        .await
        .inspect_err(|error| error!(%error, %url, "Failed to execute DDL to product db"))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

#[derive(FromRow)]
struct ProductRow {
    body: String,
}

impl super::ProductStore for SqliteStore {
    type Error = Error;

    async fn load(&self, id: &ProductId) -> Result<Option<ProductEntity>, Self::Error> {
        let id = id.to_string();
        let row = sqlx::query_as::<_, ProductRow>("SELECT body FROM products WHERE id = ?")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Sqlite)?;
        row.map(|row| serde_json::from_str(&row.body).map_err(|error| Error::Decode { id, error }))
            .transpose()
    }

    async fn store(&self, product: &ProductEntity, message: &str) -> Result<(), Self::Error> {
        let id = product.id.to_string();
        let body = serde_json::to_string(product).map_err(|error| Error::Encode {
            id: id.clone(),
            error,
        })?;
        sqlx::query(
            r#"
            INSERT INTO products(id, code, body, message, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                body = excluded.body,
                message = excluded.message,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&id)
        .bind(&product.code)
        .bind(&body)
        .bind(message)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlite)?;
        Ok(())
    }
}
