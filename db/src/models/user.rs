use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Account role.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "trainer")]
    Trainer,
}

/// Represents a login account in the `users` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Primary key ID (auto-incremented).
    #[sea_orm(primary_key)]
    pub id: i64,
    /// E-mail shaped login, unique.
    #[sea_orm(unique)]
    pub login: String,
    /// Argon2 PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// Trainers can only sign in after an admin approved them.
    pub approved: bool,
    pub trainer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::trainer::Entity",
        from = "Column::TrainerId",
        to = "super::trainer::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Trainer,
    #[sea_orm(has_many = "super::password_reset_token::Entity")]
    ResetTokens,
}

impl Related<super::trainer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trainer.def()
    }
}

impl Related<super::password_reset_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResetTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Hashes a plaintext password with Argon2 and a random salt.
pub fn hash_password(password: &str) -> Result<String, DbErr> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DbErr::Custom(format!("password hashing failed: {e}")))
}

impl Model {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        login: &str,
        password: &str,
        role: Role,
        approved: bool,
        trainer_id: Option<i64>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            login: Set(login.trim().to_string()),
            password_hash: Set(hash_password(password)?),
            role: Set(role),
            approved: Set(approved),
            trainer_id: Set(trainer_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn find_by_login<C: ConnectionTrait>(
        db: &C,
        login: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Login.eq(login.trim()))
            .one(db)
            .await
    }

    /// Trainer accounts still waiting for approval, oldest first.
    pub async fn pending<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Approved.eq(false))
            .order_by_asc(Column::CreatedAt)
            .all(db)
            .await
    }

    /// Verifies a plaintext password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub async fn set_password<C: ConnectionTrait>(
        &self,
        db: &C,
        password: &str,
    ) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.password_hash = Set(hash_password(password)?);
        active.update(db).await
    }

    pub async fn set_role_and_approval<C: ConnectionTrait>(
        &self,
        db: &C,
        role: Role,
        approved: bool,
    ) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.role = Set(role);
        active.approved = Set(approved);
        active.update(db).await
    }

    /// The oldest admin account, if any.
    pub async fn first_admin<C: ConnectionTrait>(db: &C) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Role.eq(Role::Admin))
            .order_by_asc(Column::Id)
            .one(db)
            .await
    }

    pub async fn set_login<C: ConnectionTrait>(&self, db: &C, login: &str) -> Result<Model, DbErr> {
        let mut active: ActiveModel = self.clone().into();
        active.login = Set(login.trim().to_string());
        active.update(db).await
    }
}
