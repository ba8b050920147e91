pub mod models;
pub mod schema;
pub mod test_utils;

use sea_orm::{Database, DatabaseConnection, DbErr};
use tracing::info;
use util::config::AppConfig;

/// Connects to the configured database and makes sure the schema exists.
pub async fn connect(cfg: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    if !cfg.database_path.starts_with("sqlite:") {
        util::paths::ensure_parent_dir(&cfg.database_path)
            .map_err(|e| DbErr::Custom(format!("cannot create database directory: {e}")))?;
    }

    let db = Database::connect(cfg.database_url()).await?;
    schema::ensure_schema(&db).await?;
    info!(path = %cfg.database_path, "database ready");
    Ok(db)
}
