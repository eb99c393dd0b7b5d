//! Database configuration module for scholarlink.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs. Composite unique indexes that the entity macros cannot express are
//! created explicitly.

use crate::entities::{
    Booking, BookingAddon, Earning, Notification, PaymentAttempt, Profile, Review, Service,
    ServiceAddon, Wallet, Withdrawal, review,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, TableCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/scholarlink.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database at {database_url}");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates the parent directory of a file-backed `SQLite` URL so `mode=rwc` can
/// create the database file. Other URLs are left alone.
pub fn ensure_sqlite_parent_dir(database_url: &str) -> Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
        debug!("Ensured database directory {parent:?}");
    }
    Ok(())
}

fn table_for<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    statement
}

/// Creates all tables (if missing) in foreign-key order, plus the unique
/// `(booking_id, reviewer_id)` index on reviews.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables = [
        table_for(&schema, Profile),
        table_for(&schema, Service),
        table_for(&schema, ServiceAddon),
        table_for(&schema, Booking),
        table_for(&schema, BookingAddon),
        table_for(&schema, Review),
        table_for(&schema, Earning),
        table_for(&schema, Withdrawal),
        table_for(&schema, Wallet),
        table_for(&schema, PaymentAttempt),
        table_for(&schema, Notification),
    ];

    for table in &tables {
        db.execute(builder.build(table)).await?;
    }

    let review_index = Index::create()
        .name("idx_reviews_booking_reviewer")
        .table(Review)
        .col(review::Column::BookingId)
        .col(review::Column::ReviewerId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&review_index)).await?;

    info!("Database tables ensured ({} tables)", tables.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BookingModel, ReviewModel, WithdrawalModel};
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<BookingModel> = Booking::find().limit(1).all(&db).await?;
        let _: Vec<ReviewModel> = Review::find().limit(1).all(&db).await?;
        let _: Vec<WithdrawalModel> = Withdrawal::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[test]
    fn test_ensure_sqlite_parent_dir_ignores_memory_urls() -> Result<()> {
        ensure_sqlite_parent_dir("sqlite::memory:")?;
        ensure_sqlite_parent_dir("postgres://localhost/db")?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
