use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller role as asserted by the upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
}

/// Caller identity, injected by the auth middleware in front of this
/// service as `x-customer-id` / `x-role` headers. Token issuance and
/// verification live outside this crate.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    pub fn require_staff(&self) -> Result<(), ServiceError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "staff role required".to_string(),
            ))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-customer-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing caller identity".to_string()))?;

        let role = match parts.headers.get("x-role").and_then(|v| v.to_str().ok()) {
            Some("staff") => Role::Staff,
            Some("customer") | None => Role::Customer,
            Some(other) => {
                return Err(ServiceError::Unauthorized(format!(
                    "unknown role '{}'",
                    other
                )))
            }
        };

        Ok(Identity { id, role })
    }
}
