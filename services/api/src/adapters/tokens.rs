//! services/api/src/adapters/tokens.rs
//!
//! Verifies bearer tokens against the auth service's token table.

use async_trait::async_trait;
use gamification_core::domain::{Principal, Role};
use gamification_core::ports::{PortError, PortResult, TokenVerifier};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgTokenVerifier {
    pool: PgPool,
}

impl PgTokenVerifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TokenRecord {
    user_id: Uuid,
    role: String,
}
impl TokenRecord {
    fn to_domain(self) -> Principal {
        let role = match self.role.as_str() {
            "admin" => Role::Admin,
            "service" => Role::Service,
            _ => Role::Learner,
        };
        Principal {
            user_id: self.user_id,
            role,
        }
    }
}

#[async_trait]
impl TokenVerifier for PgTokenVerifier {
    async fn verify_token(&self, token: &str) -> PortResult<Principal> {
        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT user_id, role FROM auth_tokens WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        record.map(TokenRecord::to_domain).ok_or(PortError::Unauthorized)
    }
}
