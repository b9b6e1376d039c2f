/// Request Gate
///
/// Per-request admission:
///
/// ```text
/// Unauthenticated ─► TokenPresent ─► TokenValidated ─► RoleChecked / PermissionChecked ─► Admitted
///        │                 │                │                       │
///        └─────────────────┴────────────────┴───────────────────────┴──────────────────► Rejected
/// ```
///
/// Missing or invalid bearer tokens are rejected as unauthenticated; a valid
/// token failing its role/permission requirement is rejected as forbidden.
/// Temporary tokens are admitted only by `Requirement::SecondFactorPending`.
/// Transport-agnostic; `http::middleware` adapts it to axum.
use crate::error::{IdentityError, Result};
use crate::services::AuthorizationEngine;
use crypto_core::{SessionClaims, TokenIssuer};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any full token
    Authenticated,
    AnyRole(Vec<String>),
    AnyPermission(Vec<String>),
    AllPermissions(Vec<String>),
    /// Temporary token awaiting second-factor verification (and nothing else)
    SecondFactorPending,
}

impl Requirement {
    pub fn role(name: &str) -> Self {
        Requirement::AnyRole(vec![name.to_string()])
    }

    pub fn permission(name: &str) -> Self {
        Requirement::AnyPermission(vec![name.to_string()])
    }
}

#[derive(Clone)]
pub struct RequestGate {
    tokens: Arc<TokenIssuer>,
    authz: AuthorizationEngine,
}

impl RequestGate {
    pub fn new(tokens: Arc<TokenIssuer>, authz: AuthorizationEngine) -> Self {
        Self { tokens, authz }
    }

    /// Admit or reject a request carrying `bearer` (the raw token, if any)
    pub async fn authorize(
        &self,
        bearer: Option<&str>,
        requirement: &Requirement,
    ) -> Result<SessionClaims> {
        let token = bearer.ok_or_else(|| {
            warn!("Rejected request without bearer token");
            IdentityError::Unauthenticated
        })?;

        let claims = self.tokens.validate(token).map_err(|err| {
            warn!(error = %err, "Rejected request with invalid token");
            IdentityError::from(err)
        })?;

        let wants_temporary = *requirement == Requirement::SecondFactorPending;
        if claims.is_temporary() != wants_temporary {
            warn!(
                user_id = %claims.user_id,
                temporary = claims.is_temporary(),
                "Rejected token of the wrong grade"
            );
            return Err(IdentityError::Unauthenticated);
        }

        if !self.check(&claims, requirement).await? {
            warn!(user_id = %claims.user_id, requirement = ?requirement, "Forbidden");
            return Err(IdentityError::Forbidden);
        }

        debug!(user_id = %claims.user_id, "Request admitted");
        Ok(claims)
    }

    async fn check(&self, claims: &SessionClaims, requirement: &Requirement) -> Result<bool> {
        let user_id = claims.user_id;
        match requirement {
            Requirement::Authenticated | Requirement::SecondFactorPending => Ok(true),
            // Single-item checks surface store failures instead of denying
            Requirement::AnyRole(names) if names.len() == 1 => {
                self.authz.user_has_role(user_id, &names[0]).await
            }
            Requirement::AnyPermission(names) | Requirement::AllPermissions(names)
                if names.len() == 1 =>
            {
                self.authz.user_has_permission(user_id, &names[0]).await
            }
            Requirement::AnyRole(names) => Ok(self.authz.has_any_role(user_id, names).await),
            Requirement::AnyPermission(names) => {
                Ok(self.authz.has_any_permission(user_id, names).await)
            }
            Requirement::AllPermissions(names) => {
                Ok(self.authz.has_all_permissions(user_id, names).await)
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
    }

    #[test]
    fn test_requirement_helpers() {
        assert_eq!(
            Requirement::role("admin"),
            Requirement::AnyRole(vec!["admin".to_string()])
        );
        assert_eq!(
            Requirement::permission("file:delete"),
            Requirement::AnyPermission(vec!["file:delete".to_string()])
        );
    }
}
