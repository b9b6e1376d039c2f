/// Role / permission database operations
use super::DbResult;
use crate::models::{NewPermission, Permission, Role};
use sqlx::PgPool;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Roles
// ----------------------------------------------------------------------------

pub async fn create_role(pool: &PgPool, name: &str, description: &str) -> DbResult<Role> {
    let role = Role::new(name, description);

    let created = sqlx::query_as::<_, Role>(
        r#"
        INSERT INTO roles (id, name, description, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, description, created_at, updated_at
        "#,
    )
    .bind(role.id)
    .bind(&role.name)
    .bind(&role.description)
    .bind(role.created_at)
    .bind(role.updated_at)
    .fetch_one(pool)
    .await?;

    Ok(created)
}

pub async fn get_role_by_id(pool: &PgPool, role_id: Uuid) -> DbResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, created_at, updated_at FROM roles WHERE id = $1",
    )
    .bind(role_id)
    .fetch_optional(pool)
    .await?;

    Ok(role)
}

pub async fn get_role_by_name(pool: &PgPool, name: &str) -> DbResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, created_at, updated_at FROM roles WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(role)
}

pub async fn list_roles(pool: &PgPool) -> DbResult<Vec<Role>> {
    let roles = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(roles)
}

pub async fn update_role(
    pool: &PgPool,
    role_id: Uuid,
    name: &str,
    description: &str,
) -> DbResult<Role> {
    // fetch_one maps a missing id to RowNotFound -> StoreError::NotFound
    let role = sqlx::query_as::<_, Role>(
        r#"
        UPDATE roles SET name = $2, description = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, description, created_at, updated_at
        "#,
    )
    .bind(role_id)
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;

    Ok(role)
}

pub async fn delete_role(pool: &PgPool, role_id: Uuid) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM roles WHERE id = $1")
        .bind(role_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound.into());
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Permissions
// ----------------------------------------------------------------------------

pub async fn create_permission(pool: &PgPool, permission: &NewPermission) -> DbResult<Permission> {
    let created = sqlx::query_as::<_, Permission>(
        r#"
        INSERT INTO permissions (id, name, description, resource, action, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        RETURNING id, name, description, resource, action, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&permission.name)
    .bind(&permission.description)
    .bind(&permission.resource)
    .bind(&permission.action)
    .fetch_one(pool)
    .await?;

    Ok(created)
}

pub async fn get_permission_by_id(pool: &PgPool, permission_id: Uuid) -> DbResult<Option<Permission>> {
    let permission = sqlx::query_as::<_, Permission>(
        "SELECT id, name, description, resource, action, created_at FROM permissions WHERE id = $1",
    )
    .bind(permission_id)
    .fetch_optional(pool)
    .await?;

    Ok(permission)
}

pub async fn get_permission_by_name(pool: &PgPool, name: &str) -> DbResult<Option<Permission>> {
    let permission = sqlx::query_as::<_, Permission>(
        "SELECT id, name, description, resource, action, created_at FROM permissions WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(permission)
}

pub async fn list_permissions(pool: &PgPool) -> DbResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>(
        r#"
        SELECT id, name, description, resource, action, created_at
        FROM permissions
        ORDER BY resource, action
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(permissions)
}

pub async fn delete_permission(pool: &PgPool, permission_id: Uuid) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
        .bind(permission_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound.into());
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Associations
// ----------------------------------------------------------------------------

pub async fn assign_permission_to_role(
    pool: &PgPool,
    role_id: Uuid,
    permission_id: Uuid,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(role_id)
    .bind(permission_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn remove_permission_from_role(
    pool: &PgPool,
    role_id: Uuid,
    permission_id: Uuid,
) -> DbResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
        .bind(role_id)
        .bind(permission_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_role_permissions(pool: &PgPool, role_id: Uuid) -> DbResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>(
        r#"
        SELECT p.id, p.name, p.description, p.resource, p.action, p.created_at
        FROM permissions p
        INNER JOIN role_permissions rp ON p.id = rp.permission_id
        WHERE rp.role_id = $1
        ORDER BY p.resource, p.action
        "#,
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;

    Ok(permissions)
}

pub async fn assign_role_to_user(pool: &PgPool, user_id: Uuid, role_id: Uuid) -> DbResult<()> {
    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn remove_role_from_user(pool: &PgPool, user_id: Uuid, role_id: Uuid) -> DbResult<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_user_roles(pool: &PgPool, user_id: Uuid) -> DbResult<Vec<Role>> {
    let roles = sqlx::query_as::<_, Role>(
        r#"
        SELECT r.id, r.name, r.description, r.created_at, r.updated_at
        FROM roles r
        INNER JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = $1
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(roles)
}

pub async fn get_user_permissions(pool: &PgPool, user_id: Uuid) -> DbResult<Vec<Permission>> {
    let permissions = sqlx::query_as::<_, Permission>(
        r#"
        SELECT DISTINCT p.id, p.name, p.description, p.resource, p.action, p.created_at
        FROM permissions p
        INNER JOIN role_permissions rp ON p.id = rp.permission_id
        INNER JOIN user_roles ur ON rp.role_id = ur.role_id
        WHERE ur.user_id = $1
        ORDER BY p.resource, p.action
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(permissions)
}

pub async fn user_has_role(pool: &PgPool, user_id: Uuid, role_name: &str) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM user_roles ur
            INNER JOIN roles r ON ur.role_id = r.id
            WHERE ur.user_id = $1 AND r.name = $2
        )
        "#,
    )
    .bind(user_id)
    .bind(role_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

pub async fn user_has_permission(
    pool: &PgPool,
    user_id: Uuid,
    permission_name: &str,
) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            INNER JOIN user_roles ur ON rp.role_id = ur.role_id
            WHERE ur.user_id = $1 AND p.name = $2
        )
        "#,
    )
    .bind(user_id)
    .bind(permission_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
