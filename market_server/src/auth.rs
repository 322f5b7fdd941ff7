//! Access-token handling.
//!
//! Clients authenticate with a short-lived HS256 JWT carried in the `Authorization: Bearer ...`
//! header. The token's `sub` claim is the marketplace user id; buyer/seller authorization is
//! enforced per order by the engine, not by roles in the token.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, errors::ServerError};

const DEFAULT_TOKEN_VALIDITY: Duration = Duration::hours(24);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The authenticated user id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self { encoding_key: EncodingKey::from_secret(secret), decoding_key: DecodingKey::from_secret(secret) }
    }

    /// Issues a new access token for the given user id. Authentication of the user itself (the
    /// login flow) lives outside this subsystem.
    pub fn issue_token(&self, user_id: &str, validity: Option<Duration>) -> Result<String, ServerError> {
        let now = Utc::now();
        let validity = validity.unwrap_or(DEFAULT_TOKEN_VALIDITY);
        let claims =
            JwtClaims { sub: user_id.to_string(), iat: now.timestamp(), exp: (now + validity).timestamp() };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServerError::AuthenticationError(format!("Could not sign access token. {e}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, ServerError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<JwtClaims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ServerError::AuthenticationError("Access token has expired".to_string()),
            _ => ServerError::AuthenticationError(format!("Invalid access token. {e}")),
        })?;
        Ok(data.claims)
    }
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_request(req))
    }
}

fn claims_from_request(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| ServerError::InitializeError("TokenIssuer is not configured".to_string()))?;
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::AuthenticationError("No Authorization header provided".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::AuthenticationError("Authorization header is not a Bearer token".to_string()))?;
    let claims = issuer.validate_token(token)?;
    debug!("🔑️ Authenticated request for user {}", claims.sub);
    Ok(claims)
}
