//! # Auth Gate
//!
//! Runs before every weather endpoint and resolves who is calling.
//!
//! ## Modes
//!
//! Picked once at startup from the configuration:
//!
//! - **Disabled**: no identity provider configured, requests pass through unauthenticated
//! - **DevBypass**: every request gets the synthetic development user, never allowed in production
//! - **Provider**: bearer tokens verified against the identity provider's signing keys
//!
//! The `dev-token` sentinel resolves to the development user in every mode outside production.
//!
//! ## Provider Checks
//!
//! 1. `Authorization` header present, else `authorization_required`
//! 2. Header is `Bearer <token>`, else `invalid_authorization_header`
//! 3. Token has three URL-safe base64 segments, else `invalid_token_format` without touching the network
//! 4. Signature, issuer and audience verified, else `invalid_token`
//!
//! ## Scope
//!
//! Optional second gate. Every required scope must appear in the caller's space-delimited `scope`
//! or in their roles, else `insufficient_scope`.
use std::{
    collections::HashSet,
    sync::{Arc, LazyLock},
};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::AppError,
    jwks::{Claims, JwtVerifier},
    state::AppState,
};

pub const DEV_TOKEN: &str = "dev-token";
const DEV_SUB: &str = "dev";
const DEV_EMAIL: &str = "dev@example.com";

static TOKEN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").expect("valid token pattern")
});

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization header is required")]
    AuthorizationRequired,

    #[error("Authorization header must be of the form Bearer <token>")]
    InvalidAuthorizationHeader,

    #[error("Token is not a well-formed JWT")]
    InvalidTokenFormat,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Insufficient scope")]
    InsufficientScope,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InsufficientScope => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AuthorizationRequired => "authorization_required",
            AuthError::InvalidAuthorizationHeader => "invalid_authorization_header",
            AuthError::InvalidTokenFormat => "invalid_token_format",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::InsufficientScope => "insufficient_scope",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub sub: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Request extension set by [`require_auth`], `None` when passed through unauthenticated.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<AuthenticatedUser>);

pub enum AuthMode {
    Disabled,
    DevBypass,
    Provider(JwtVerifier),
}

pub struct AuthGate {
    mode: AuthMode,
    production: bool,
    required_scope: Option<String>,
    roles_claim: String,
}

impl AuthGate {
    pub fn new(mode: AuthMode, config: &Config) -> Self {
        Self {
            mode,
            production: config.is_production(),
            required_scope: config
                .require_scope
                .then(|| config.required_scope.clone()),
            roles_claim: config.roles_claim.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mode = if config.dev_auth_bypass {
            AuthMode::DevBypass
        } else {
            match (config.jwks_uri(), config.issuer()) {
                (Some(jwks_uri), Some(issuer)) => AuthMode::Provider(JwtVerifier::new(
                    jwks_uri,
                    issuer,
                    config.auth0_audience.clone(),
                )),
                _ => AuthMode::Disabled,
            }
        };

        let gate = Self::new(mode, config);
        info!("Auth mode: {}", gate.mode_name());

        gate
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            AuthMode::Disabled => "disabled",
            AuthMode::DevBypass => "dev-bypass",
            AuthMode::Provider(_) => "provider",
        }
    }

    pub fn scope_gate_enabled(&self) -> bool {
        self.required_scope.is_some()
    }

    pub async fn authenticate(
        &self,
        header: Option<&HeaderValue>,
    ) -> Result<Option<AuthenticatedUser>, AuthError> {
        match &self.mode {
            AuthMode::DevBypass => Ok(Some(self.dev_user())),
            AuthMode::Disabled => {
                let dev_token = header
                    .and_then(|value| bearer_token(value).ok())
                    .is_some_and(|token| self.accepts_dev_token(token));

                Ok(dev_token.then(|| self.dev_user()))
            }
            AuthMode::Provider(verifier) => {
                let header = header.ok_or(AuthError::AuthorizationRequired)?;
                let token = bearer_token(header)?;

                if self.accepts_dev_token(token) {
                    return Ok(Some(self.dev_user()));
                }

                if !TOKEN_SHAPE.is_match(token) {
                    debug!("Rejecting malformed bearer token");
                    return Err(AuthError::InvalidTokenFormat);
                }

                let claims = verifier.verify(token).await?;

                Ok(Some(self.user_from_claims(claims)))
            }
        }
    }

    pub fn check_scope(&self, user: Option<&AuthenticatedUser>) -> Result<(), AuthError> {
        let (Some(required), Some(user)) = (&self.required_scope, user) else {
            return Ok(());
        };

        let granted: HashSet<&str> = user
            .scope
            .iter()
            .flat_map(|scope| scope.split_whitespace())
            .chain(user.roles.iter().flatten().map(String::as_str))
            .collect();

        if required.split_whitespace().all(|scope| granted.contains(scope)) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope)
        }
    }

    fn accepts_dev_token(&self, token: &str) -> bool {
        !self.production && token == DEV_TOKEN
    }

    fn dev_user(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            sub: DEV_SUB.to_string(),
            email: DEV_EMAIL.to_string(),
            scope: self.required_scope.clone(),
            roles: None,
        }
    }

    fn user_from_claims(&self, claims: Claims) -> AuthenticatedUser {
        let mut roles = claims.permissions.unwrap_or_default();

        if let Some(Value::Array(custom)) = claims.extra.get(&self.roles_claim) {
            roles.extend(custom.iter().filter_map(Value::as_str).map(str::to_string));
        }

        AuthenticatedUser {
            sub: claims.sub,
            email: claims.email.unwrap_or_default(),
            scope: claims.scope,
            roles: (!roles.is_empty()).then_some(roles),
        }
    }
}

fn bearer_token(header: &HeaderValue) -> Result<&str, AuthError> {
    let raw = header
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorizationHeader)?;

    let mut parts = raw.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidAuthorizationHeader),
    }
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = state
        .auth
        .authenticate(request.headers().get(AUTHORIZATION))
        .await?;

    request.extensions_mut().insert(Caller(user));

    Ok(next.run(request).await)
}

pub async fn require_scope(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<Caller>()
        .and_then(|caller| caller.0.as_ref());

    state.auth.check_scope(user)?;

    Ok(next.run(request).await)
}
