//! JWT authentication for the thin HTTP front end.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::{fs, sync::Arc};

use crate::{config::AuthConfig, error::Error};

/// Claims carried by an inbound bearer token. The connector host only
/// needs to know who is calling and whether the token is still valid;
/// authorization (which operations a caller may invoke) is left to the
/// control plane that issued the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// JWT authentication middleware state.
#[derive(Clone)]
pub struct JwtAuth {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(config: &AuthConfig) -> Result<Self, Error> {
        let key_bytes = fs::read(&config.jwt_public_key_path).map_err(|e| {
            Error::ConfigInvalid(format!(
                "failed to read JWT public key from '{}': {e}",
                config.jwt_public_key_path.display()
            ))
        })?;

        let algorithm = match config.jwt_algorithm.to_uppercase().as_str() {
            "RS256" => Algorithm::RS256,
            "RS384" => Algorithm::RS384,
            "RS512" => Algorithm::RS512,
            "ES256" => Algorithm::ES256,
            "ES384" => Algorithm::ES384,
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(Error::ConfigInvalid(format!("unsupported JWT algorithm: {other}"))),
        };

        let decoding_key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                DecodingKey::from_rsa_pem(&key_bytes).map_err(Error::TokenInvalid)?
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                DecodingKey::from_ec_pem(&key_bytes).map_err(Error::TokenInvalid)?
            }
            _ => DecodingKey::from_secret(&key_bytes),
        };

        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &config.jwt_audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            decoding_key: Arc::new(decoding_key),
            validation,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, Error> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    pub fn extract_token(headers: &HeaderMap) -> Result<String, Error> {
        let header = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("missing Authorization header".to_string()))?;

        header
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| Error::Unauthorized("Authorization header must be a Bearer token".to_string()))
    }

    pub async fn middleware(
        State(auth): State<Self>,
        mut request: Request<Body>,
        next: Next,
    ) -> Result<Response, Error> {
        let token = Self::extract_token(request.headers())?;
        let claims = auth.validate_token(&token)?;
        request.extensions_mut().insert(claims);
        Ok(next.run(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_requires_bearer_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Basic xyz".parse().unwrap());
        assert!(matches!(
            JwtAuth::extract_token(&headers),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn extract_token_strips_bearer_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(JwtAuth::extract_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(
            JwtAuth::extract_token(&headers),
            Err(Error::Unauthorized(_))
        ));
    }
}
