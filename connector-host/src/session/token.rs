//! OAuth2 client-credentials token provider with single-flight refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use oauth2::basic::{BasicErrorResponse, BasicTokenType};
use oauth2::{
    Client, ClientId, ClientSecret, EmptyExtraTokenFields, EndpointNotSet, EndpointSet, Scope,
    StandardRevocableToken, StandardTokenIntrospectionResponse, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Tokens are renewed this long before their reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);
/// Assumed lifetime when the token response omits `expires_in`.
const DEFAULT_EXPIRY: Duration = Duration::from_secs(300);

type CredentialsClient = Client<
    BasicErrorResponse,
    StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardRevocableToken,
    BasicErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

struct CachedToken {
    access_token: String,
    valid_until: Instant,
}

/// Caches a client-credentials access token until `EXPIRY_SKEW` before it
/// expires, refreshing at most once concurrently.
pub struct TokenProvider {
    client: CredentialsClient,
    http_client: HttpClient,
    scope: Option<String>,
    audience: Option<String>,
    resource: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(config: &SessionConfig) -> Result<Arc<Self>> {
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| Error::ConfigInvalid(format!("invalid token URL: {e}")))?;

        let client = Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_token_uri(token_url);

        let http_client = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::ConfigInvalid(format!("failed to build OAuth HTTP client: {e}")))?;

        Ok(Arc::new(Self {
            client,
            http_client,
            scope: config.scope.clone(),
            audience: config.audience.clone(),
            resource: config.resource.clone(),
            cached: Mutex::new(None),
        }))
    }

    /// Returns a valid access token, fetching a fresh one if the cached
    /// value is absent or within `EXPIRY_SKEW` of expiring.
    pub async fn token(&self) -> Result<String> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.valid_until > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let access_token = fresh.access_token().secret().clone();
        let lifetime = fresh.expires_in().unwrap_or(DEFAULT_EXPIRY);
        let valid_until = Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW).max(Duration::from_secs(1));

        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            valid_until,
        });
        Ok(access_token)
    }

    /// Drops the cached token, forcing the next `token()` call to fetch a
    /// fresh one. Called after a 401/403 on the WebSocket upgrade.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch(&self) -> Result<StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>> {
        let mut request = self.client.exchange_client_credentials();
        if let Some(scope) = &self.scope {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        if let Some(audience) = &self.audience {
            request = request.add_extra_param("audience", audience.clone());
        }
        if let Some(resource) = &self.resource {
            request = request.add_extra_param("resource", resource.clone());
        }

        request.request_async(&self.http_client).await.map_err(|err| {
            let body = err.to_string();
            let truncated: String = body.chars().take(512).collect();
            Error::TokenRequestFailed {
                status: 0,
                body: truncated,
            }
        })
    }
}
