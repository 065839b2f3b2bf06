use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use harvest_core::{Capability, RequestContext};
use harvest_shared::pii::Masked;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

/// Header carrying the anti-forgery token on state-changing requests.
pub const ANTI_FORGERY_HEADER: &str = "x-csrf-token";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Session anti-forgery token.
    #[serde(default)]
    pub csrf: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn new(auth: &AuthConfig, sub: &str, role: &str, csrf: Option<&str>) -> Self {
        Self {
            sub: sub.to_string(),
            role: role.to_string(),
            permissions: Vec::new(),
            csrf: csrf.map(str::to_string),
            exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
        }
    }

    /// Builds the request context handed to every core operation.
    pub fn into_context(self) -> RequestContext {
        let permissions: Vec<Capability> = self
            .permissions
            .iter()
            .filter_map(|p| match p.parse::<Capability>() {
                Ok(capability) => Some(capability),
                Err(_) => {
                    warn!(subject = %self.sub, permission = %p, "Ignoring unknown permission");
                    None
                }
            })
            .collect();
        RequestContext::new(self.sub, self.role, permissions, self.csrf.map(Masked::new))
    }
}

pub fn issue_token(auth: &AuthConfig, claims: &Claims) -> Result<String, AppError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))
}

/// Authenticates the caller and, for state-changing methods, checks the
/// anti-forgery token before the handler runs.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?;
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    let ctx = token_data.claims.into_context();

    if !matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        let submitted = req
            .headers()
            .get(ANTI_FORGERY_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        ctx.verify_anti_forgery(submitted).inspect_err(|_| {
            warn!(actor = ?ctx.actor(), path = %req.uri().path(), "Anti-forgery check failed");
        })?;
    }

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
