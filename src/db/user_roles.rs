//! User role persistence.

use sqlx::Row;

use super::repository::{new_id, not_found, now_rfc3339, parse_json_array, Repository};
use crate::errors::AppError;
use crate::models::{CreateUserRoleRequest, UpdateUserRoleRequest, UserRole};
use crate::realtime::{ChangeKind, Table};

impl Repository {
    /// List all user roles.
    pub async fn list_user_roles(&self) -> Result<Vec<UserRole>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, role, permissions, created_at FROM user_roles ORDER BY user_id, role",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_role_from_row).collect())
    }

    /// Get a user role by ID.
    pub async fn get_user_role(&self, id: &str) -> Result<Option<UserRole>, AppError> {
        let row = sqlx::query(
            "SELECT id, user_id, role, permissions, created_at FROM user_roles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_role_from_row))
    }

    /// Grant a role to a user.
    pub async fn create_user_role(
        &self,
        request: &CreateUserRoleRequest,
    ) -> Result<UserRole, AppError> {
        let id = new_id();
        let now = now_rfc3339();
        let permissions_json = serde_json::to_string(&request.permissions)?;

        sqlx::query(
            "INSERT INTO user_roles (id, user_id, role, permissions, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(&request.role)
        .bind(&permissions_json)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.record_change(Table::UserRoles, ChangeKind::Insert, &id)
            .await?;

        Ok(UserRole {
            id,
            user_id: request.user_id.clone(),
            role: request.role.clone(),
            permissions: request.permissions.clone(),
            created_at: now,
        })
    }

    /// Change a user's role or permissions.
    pub async fn update_user_role(
        &self,
        id: &str,
        request: &UpdateUserRoleRequest,
    ) -> Result<UserRole, AppError> {
        let existing = self
            .get_user_role(id)
            .await?
            .ok_or_else(|| not_found("User role", id))?;

        let updated = UserRole {
            role: request.role.clone().unwrap_or(existing.role),
            permissions: request.permissions.clone().unwrap_or(existing.permissions),
            ..existing
        };
        let permissions_json = serde_json::to_string(&updated.permissions)?;

        sqlx::query("UPDATE user_roles SET role = ?, permissions = ? WHERE id = ?")
            .bind(&updated.role)
            .bind(&permissions_json)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.record_change(Table::UserRoles, ChangeKind::Update, id)
            .await?;

        Ok(updated)
    }

    /// Revoke a user role.
    pub async fn delete_user_role(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("User role", id));
        }

        self.record_change(Table::UserRoles, ChangeKind::Delete, id)
            .await?;
        Ok(())
    }
}

fn user_role_from_row(row: &sqlx::sqlite::SqliteRow) -> UserRole {
    let permissions_str: Option<String> = row.get("permissions");
    UserRole {
        id: row.get("id"),
        user_id: row.get("user_id"),
        role: row.get("role"),
        permissions: permissions_str
            .map(|s| parse_json_array(&s))
            .unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}
