/// User database operations for identity-service
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, User};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, phone, first_name, last_name, status, \
                            email_verified_at, created_at, updated_at";

/// PostgreSQL unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Persistence contract for user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, assigning id and timestamps.
    ///
    /// Fails with `EmailAlreadyExists` when the email is taken; the uniqueness
    /// check and the insert are a single atomic step.
    async fn create(&self, new_user: NewUser) -> Result<User>;

    /// Fails with `UserNotFound` on miss.
    async fn find_by_email(&self, email: &str) -> Result<User>;

    /// Fails with `UserNotFound` on miss.
    async fn find_by_id(&self, user_id: Uuid) -> Result<User>;

    /// Persist every mutable field of `user`; `UserNotFound` if no row matched.
    async fn update(&self, user: &User) -> Result<()>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User> {
        let query = format!(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(new_user.status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err)
                    if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
                {
                    IdentityError::EmailAlreadyExists
                }
                other => IdentityError::from(other),
            })
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET phone = $1,
                first_name = $2,
                last_name = $3,
                status = $4,
                email_verified_at = $5,
                password_hash = $6,
                updated_at = NOW()
            WHERE id = $7
            "#,
        )
        .bind(&user.phone)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.status)
        .bind(user.email_verified_at)
        .bind(&user.password_hash)
        .bind(user.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::UserNotFound);
        }

        Ok(())
    }
}
