/// PostgreSQL persistence for users and RBAC
pub mod rbac;
pub mod store;
pub mod users;

pub use store::PgIdentityStore;

use crate::ports::StoreError;

pub type DbResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::NotFound(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            _ => {
                tracing::error!("Database error: {}", err);
                StoreError::Unavailable(err.to_string())
            }
        }
    }
}
