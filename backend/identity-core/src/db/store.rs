/// `PgIdentityStore`: the PostgreSQL-backed `UserRepository` + `RbacRepository`
use super::{rbac, users, DbResult};
use crate::models::{NewPermission, Permission, Role, User};
use crate::ports::{RbacRepository, StoreError, UserRepository};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_permissions(&self, mut role: Role) -> DbResult<Role> {
        role.permissions = rbac::get_role_permissions(&self.pool, role.id).await?;
        Ok(role)
    }

    async fn all_with_permissions(&self, roles: Vec<Role>) -> DbResult<Vec<Role>> {
        let mut loaded = Vec::with_capacity(roles.len());
        for role in roles {
            loaded.push(self.with_permissions(role).await?);
        }
        Ok(loaded)
    }
}

#[async_trait]
impl UserRepository for PgIdentityStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        users::find_by_id(&self.pool, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        users::find_by_email(&self.pool, email).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        users::find_by_phone(&self.pool, phone).await
    }

    async fn create_with_phone(&self, phone: &str) -> Result<User, StoreError> {
        users::create_with_phone(&self.pool, phone).await
    }

    async fn set_two_factor_secret(&self, user_id: Uuid, secret: &str) -> Result<(), StoreError> {
        users::set_two_factor_secret(&self.pool, user_id, secret).await
    }

    async fn enable_two_factor(
        &self,
        user_id: Uuid,
        backup_code_hashes: &[String],
    ) -> Result<(), StoreError> {
        users::enable_two_factor(&self.pool, user_id, backup_code_hashes).await
    }

    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> Result<bool, StoreError> {
        users::consume_backup_code(&self.pool, user_id, code_hash).await
    }
}

#[async_trait]
impl RbacRepository for PgIdentityStore {
    async fn create_role(&self, name: &str, description: &str) -> Result<Role, StoreError> {
        rbac::create_role(&self.pool, name, description).await
    }

    async fn get_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, StoreError> {
        match rbac::get_role_by_id(&self.pool, role_id).await? {
            Some(role) => Ok(Some(self.with_permissions(role).await?)),
            None => Ok(None),
        }
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        match rbac::get_role_by_name(&self.pool, name).await? {
            Some(role) => Ok(Some(self.with_permissions(role).await?)),
            None => Ok(None),
        }
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let roles = rbac::list_roles(&self.pool).await?;
        self.all_with_permissions(roles).await
    }

    async fn update_role(
        &self,
        role_id: Uuid,
        name: &str,
        description: &str,
    ) -> Result<Role, StoreError> {
        let role = rbac::update_role(&self.pool, role_id, name, description).await?;
        self.with_permissions(role).await
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<(), StoreError> {
        rbac::delete_role(&self.pool, role_id).await
    }

    async fn create_permission(
        &self,
        permission: &NewPermission,
    ) -> Result<Permission, StoreError> {
        rbac::create_permission(&self.pool, permission).await
    }

    async fn get_permission_by_id(
        &self,
        permission_id: Uuid,
    ) -> Result<Option<Permission>, StoreError> {
        rbac::get_permission_by_id(&self.pool, permission_id).await
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        rbac::get_permission_by_name(&self.pool, name).await
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        rbac::list_permissions(&self.pool).await
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<(), StoreError> {
        rbac::delete_permission(&self.pool, permission_id).await
    }

    async fn assign_permission_to_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        rbac::assign_permission_to_role(&self.pool, role_id, permission_id).await
    }

    async fn remove_permission_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        rbac::remove_permission_from_role(&self.pool, role_id, permission_id).await
    }

    async fn get_role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        rbac::get_role_permissions(&self.pool, role_id).await
    }

    async fn assign_role_to_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        rbac::assign_role_to_user(&self.pool, user_id, role_id).await
    }

    async fn remove_role_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        rbac::remove_role_from_user(&self.pool, user_id, role_id).await
    }

    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let roles = rbac::get_user_roles(&self.pool, user_id).await?;
        self.all_with_permissions(roles).await
    }

    async fn get_user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        rbac::get_user_permissions(&self.pool, user_id).await
    }

    async fn user_has_role(&self, user_id: Uuid, role_name: &str) -> Result<bool, StoreError> {
        rbac::user_has_role(&self.pool, user_id, role_name).await
    }

    async fn user_has_permission(
        &self,
        user_id: Uuid,
        permission_name: &str,
    ) -> Result<bool, StoreError> {
        rbac::user_has_permission(&self.pool, user_id, permission_name).await
    }
}
