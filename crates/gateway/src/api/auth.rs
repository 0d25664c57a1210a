//! Bearer-token authentication.
//!
//! Tokens are verified against the upstream identity provider; the user id
//! comes from the token's claims, never from the request body. The
//! [`AuthVerifier`] trait keeps handlers testable with a stub.

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use rv_domain::config::AuthConfig;
use rv_domain::{Error, Result};

use crate::state::AppState;

/// A verified authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait::async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser>;
}

/// Verifies tokens against the identity provider's user endpoint
/// (`GET {verify_url}` with the bearer token, returning `{id, email}`).
pub struct HttpAuthVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpAuthVerifier {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url: cfg.verify_url.clone(),
        }
    }
}

#[async_trait::async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
        if self.verify_url.is_empty() {
            return Err(Error::Config("auth.verify_url is not configured".into()));
        }

        let resp = self
            .client
            .get(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("identity provider unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Auth("token inválido ou expirado".into()));
        }

        resp.json::<AuthenticatedUser>()
            .await
            .map_err(|e| Error::Auth(format!("malformed identity response: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Axum extractor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AuthRejection(StatusCode, String);

impl axum::response::IntoResponse for AuthRejection {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AuthRejection(
                    StatusCode::UNAUTHORIZED,
                    "Credenciais em falta".to_string(),
                )
            })?;

        match state.auth.verify(token).await {
            Ok(user) => Ok(user),
            Err(Error::Config(_)) => Err(AuthRejection(
                StatusCode::SERVICE_UNAVAILABLE,
                "Serviço de autenticação indisponível".to_string(),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "token verification failed");
                Err(AuthRejection(
                    StatusCode::UNAUTHORIZED,
                    "Token inválido ou expirado".to_string(),
                ))
            }
        }
    }
}
