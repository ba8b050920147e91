use sea_orm::{Database, DatabaseConnection};

use crate::schema::ensure_schema;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");

    ensure_schema(&db)
        .await
        .expect("Failed to create schema");

    db
}
