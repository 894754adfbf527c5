/// Role and permission queries backing the RBAC contract
use crate::error::Result;
use crate::rbac::PermissionResolver;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgPermissionResolver {
    pool: PgPool,
}

impl PgPermissionResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionResolver for PgPermissionResolver {
    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(role)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, r.id FROM roles r WHERE r.name = $2
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            user_id = %user_id,
            role = %role,
            newly_assigned = result.rows_affected() > 0,
            "Role assignment applied"
        );
        Ok(())
    }

    async fn list_roles(&self, user_id: Uuid) -> Result<Vec<String>> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn resolve_permissions(&self, user_id: Uuid) -> Result<Vec<String>> {
        let permissions = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name
            FROM permissions p
            JOIN role_permissions rp ON rp.perm_id = p.id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn has_permission(&self, user_id: Uuid, permission: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM permissions p
                JOIN role_permissions rp ON rp.perm_id = p.id
                JOIN user_roles ur ON ur.role_id = rp.role_id
                WHERE ur.user_id = $1 AND p.name = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(permission)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn grant_permission(&self, role: &str, permission: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(role)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO permissions (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(permission)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, perm_id)
            SELECT r.id, p.id FROM roles r, permissions p
            WHERE r.name = $1 AND p.name = $2
            ON CONFLICT (role_id, perm_id) DO NOTHING
            "#,
        )
        .bind(role)
        .bind(permission)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
