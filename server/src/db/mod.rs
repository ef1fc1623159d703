//! SQLx pool construction and schema migrations.
//!
//! The pool is built once at startup and shared through `AppState`; embedded
//! migrations run before the server binds so REST and websocket traffic only
//! ever sees the current schema.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

fn max_connections() -> u32 {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}

/// Connect to Postgres and bring the schema up to date.
///
/// # Errors
///
/// Returns an error if the connection cannot be established or a migration
/// fails to apply.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections())
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}
