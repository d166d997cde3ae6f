//! # Token Verification
//!
//! RS256 bearer tokens checked against the identity provider's published key set.
//!
//! ## Signing Keys
//!
//! - Fetched from the provider's JWKS endpoint on demand
//! - Cached by `kid` for 10 minutes
//! - A `kid` we have not seen triggers a refetch, at most 5 per minute
//! - A token without `kid` is accepted only when the set holds exactly one key
//!
//! ## Claims Checked
//!
//! - Signature against the key named by the token header
//! - Issuer `https://<domain>/`
//! - Audience, when one is configured
//! - Expiry
use std::{collections::HashMap, num::NonZeroU32, time::Duration};

use governor::{Quota, RateLimiter as GovLimiter};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::{Jwk, JwkSet},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{auth::AuthError, cache::TtlCache};

const KEY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
const JWKS_REQUESTS_PER_MINUTE: u32 = 5;

type RefreshLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

pub struct JwtVerifier {
    http: Client,
    jwks_uri: String,
    issuer: String,
    audience: Option<String>,
    /// `None` holds the sole key of a single-key set.
    keys: TtlCache<Option<String>, Jwk>,
    refresh_limiter: RefreshLimiter,
}

impl JwtVerifier {
    pub fn new(jwks_uri: String, issuer: String, audience: Option<String>) -> Self {
        let per_minute = NonZeroU32::new(JWKS_REQUESTS_PER_MINUTE).unwrap_or(NonZeroU32::MIN);

        Self {
            http: Client::new(),
            jwks_uri,
            issuer,
            audience,
            keys: TtlCache::new(KEY_CACHE_TTL),
            refresh_limiter: GovLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let jwk = self.signing_key(header.kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        debug!("Verified token for {}", data.claims.sub);

        Ok(data.claims)
    }

    async fn signing_key(&self, kid: Option<String>) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.keys.get(&kid) {
            return Ok(jwk);
        }

        let not_found = || match &kid {
            Some(kid) => AuthError::InvalidToken(format!("signing key {kid} not found")),
            None => AuthError::InvalidToken("token header has no kid".to_string()),
        };

        if self.refresh_limiter.check().is_err() {
            warn!("JWKS refresh rate limited, rejecting unknown key {kid:?}");
            return Err(not_found());
        }

        self.refresh_keys().await?;

        self.keys.get(&kid).ok_or_else(not_found)
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        info!("Fetching signing keys from {}", self.jwks_uri);

        let jwks = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AuthError::InvalidToken(format!("failed to fetch signing keys: {e}")))?
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::InvalidToken(format!("malformed signing keys: {e}")))?;

        if let [sole] = jwks.keys.as_slice() {
            self.keys.set(None, sole.clone());
        }

        for jwk in jwks.keys {
            if let Some(kid) = jwk.common.key_id.clone() {
                self.keys.set(Some(kid), jwk);
            }
        }

        Ok(())
    }
}
