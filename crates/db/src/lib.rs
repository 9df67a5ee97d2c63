pub mod error;
pub mod models;
pub mod store;
#[cfg(test)]
mod tests;

pub use error::{StoreError, StoreResult};
pub use sqlx::SqlitePool;
pub use store::Store;

use sqlx::sqlite::SqlitePoolOptions;

/// Connects and runs embedded migrations in one step.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
