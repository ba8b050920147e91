//! Creates the tables described by the entities and seeds default settings.
//!
//! Table creation is idempotent (`IF NOT EXISTS`) and follows foreign-key
//! order, so it can run on every startup.

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::{debug, info};
use util::settings::DEFAULT_VALUES;

use crate::models::{
    Participant, PasswordResetToken, SessionParticipant, Setting, Trainer, TrainingSession, User,
    setting,
};

async fn create_table<C, E>(db: &C, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let table = entity.table_name().to_owned();
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    debug!(%table, "table ensured");
    Ok(())
}

/// Creates every missing table.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    create_table(db, Trainer).await?;
    create_table(db, User).await?;
    create_table(db, Participant).await?;
    create_table(db, TrainingSession).await?;
    create_table(db, SessionParticipant).await?;
    create_table(db, Setting).await?;
    create_table(db, PasswordResetToken).await?;
    Ok(())
}

/// Stores the built-in default for every setting that has no row yet.
pub async fn seed_default_settings<C: ConnectionTrait>(db: &C) -> Result<usize, DbErr> {
    let mut inserted = 0;
    for (key, value) in DEFAULT_VALUES {
        if setting::Model::insert_if_absent(db, key, value).await? {
            inserted += 1;
        }
    }
    if inserted > 0 {
        info!(inserted, "seeded default settings");
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn schema_and_seed_are_idempotent() {
        let db = setup_test_db().await;
        ensure_schema(&db).await.unwrap();

        let first = seed_default_settings(&db).await.unwrap();
        assert_eq!(first, DEFAULT_VALUES.len());
        assert_eq!(seed_default_settings(&db).await.unwrap(), 0);
    }
}
