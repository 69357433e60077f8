//! Authentication middleware
//!
//! Verifies the bearer token issued by the auth provider and turns its
//! claims into the request-scoped `AccessContext`.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use shared::AccessContext;

use crate::error::{ErrorDetail, ErrorResponse};
use crate::AppState;

/// Roles that lift branch scoping
const ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub branch_id: uuid::Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.iter().any(|r| self.has_role(r))
    }

    /// Capability scope handed to every service call
    pub fn access(&self) -> AccessContext {
        AccessContext::new(self.user_id, self.branch_id, self.is_admin())
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let claims = match decode_jwt(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(msg) => return unauthorized_response(&msg),
    };

    let auth_user = match claims.into_auth_user() {
        Ok(user) => user,
        Err(msg) => return unauthorized_response(msg),
    };

    tracing::debug!(user_id = %auth_user.user_id, branch_id = %auth_user.branch_id, "authenticated");
    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// JWT claims structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    pub branch_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn into_auth_user(self) -> Result<AuthUser, &'static str> {
        let user_id =
            uuid::Uuid::parse_str(&self.sub).map_err(|_| "Invalid user ID in token")?;
        let branch_id =
            uuid::Uuid::parse_str(&self.branch_id).map_err(|_| "Invalid branch ID in token")?;
        Ok(AuthUser {
            user_id,
            branch_id,
            roles: self.roles,
        })
    }
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}
