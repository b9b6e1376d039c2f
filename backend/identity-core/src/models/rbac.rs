use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reserved role names
pub const ADMIN_ROLE: &str = "admin";
pub const USER_ROLE: &str = "user";
pub const MODERATOR_ROLE: &str = "moderator";

/// Named bundle of permissions assignable to users
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(name: &str, description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            permissions: Vec::new(),
        }
    }
}

/// Atomic (resource, action) authorization unit
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a permission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}

impl NewPermission {
    pub fn new(name: &str, resource: &str, action: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    pub fn into_permission(self) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            resource: self.resource,
            action: self.action,
            created_at: Utc::now(),
        }
    }
}
