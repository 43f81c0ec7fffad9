//! Schema migrations for the `users` and `books` tables.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply every pending migration. Already-applied ones are skipped.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await?;
    info!(embedded = MIGRATOR.iter().count(), "database schema up to date");
    Ok(())
}
