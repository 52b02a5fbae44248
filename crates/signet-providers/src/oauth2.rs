// crates/signet-providers/src/oauth2.rs
// ============================================================================
// Module: Upstream OAuth2 Provider
// Description: Authorization URL construction and code exchange.
// Purpose: Drive the redirect/callback flow against remote OAuth2 servers.
// Dependencies: signet-core, reqwest, url, serde_json
// ============================================================================

//! ## Overview
//! An upstream provider instance is materialized from a tenant's provider
//! record (with the secret already decrypted). It builds the authorization
//! redirect, exchanges the returned code for tokens, and fetches the
//! userinfo claims that become the authenticated [`signet_core::Subject`].
//! All outbound calls carry their own short deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use signet_core::ProviderKind;
use signet_core::ProviderName;
use url::Url;

use crate::ProviderError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Deadline for upstream token and userinfo calls.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum accepted userinfo response size in bytes.
const MAX_USERINFO_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Materialized upstream OAuth2/OIDC provider.
///
/// # Invariants
/// - `client_secret` is the decrypted plaintext; instances are short-lived
///   and never persisted.
#[derive(Debug, Clone)]
pub struct UpstreamOAuthProvider {
    /// Provider name within the tenant.
    pub name: ProviderName,
    /// Provider kind.
    pub kind: ProviderKind,
    /// Upstream client identifier.
    pub client_id: String,
    /// Decrypted upstream client secret, when configured.
    pub client_secret: Option<String>,
    /// Interpolated authorization endpoint.
    pub authorization_endpoint: String,
    /// Interpolated token endpoint.
    pub token_endpoint: String,
    /// Interpolated userinfo endpoint, when the kind has one.
    pub userinfo_endpoint: Option<String>,
    /// Scopes requested from the upstream provider.
    pub scopes: Vec<String>,
    /// Whether PKCE is sent on the authorization request.
    pub pkce_required: bool,
}

/// Token response from the upstream token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTokens {
    /// Upstream access token.
    pub access_token: String,
    /// Upstream ID token, when the provider is OIDC.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Token type label.
    #[serde(default)]
    pub token_type: Option<String>,
}

impl UpstreamOAuthProvider {
    /// Builds the authorization redirect URL.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidInput`] when the endpoint is not a
    /// valid URL.
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.authorization_endpoint).map_err(|err| {
            ProviderError::InvalidInput(format!("invalid authorization endpoint: {err}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("state", state);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            if let Some(challenge) = code_challenge {
                query.append_pair("code_challenge", challenge);
                query.append_pair("code_challenge_method", "S256");
            }
        }
        Ok(url)
    }

    /// Exchanges an authorization code at the upstream token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Upstream`] when the exchange fails or the
    /// response does not parse.
    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<UpstreamTokens, ProviderError> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", self.client_id.clone()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }
        let response = http
            .post(&self.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await
            .map_err(|err| ProviderError::Upstream(format!("token exchange failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        response
            .json::<UpstreamTokens>()
            .await
            .map_err(|err| ProviderError::Upstream(format!("invalid token response: {err}")))
    }

    /// Fetches userinfo claims with the upstream access token.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Upstream`] when the call fails, the response
    /// exceeds the size bound, or the body is not a JSON object.
    pub async fn fetch_userinfo(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<Value, ProviderError> {
        let Some(endpoint) = &self.userinfo_endpoint else {
            return Err(ProviderError::Upstream(
                "provider has no userinfo endpoint".to_string(),
            ));
        };
        let response = http
            .get(endpoint)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await
            .map_err(|err| ProviderError::Upstream(format!("userinfo fetch failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProviderError::Upstream(format!("userinfo read failed: {err}")))?;
        if bytes.len() > MAX_USERINFO_BYTES {
            return Err(ProviderError::Upstream("userinfo response too large".to_string()));
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|err| ProviderError::Upstream(format!("invalid userinfo body: {err}")))?;
        if !value.is_object() {
            return Err(ProviderError::Upstream("userinfo body is not an object".to_string()));
        }
        Ok(value)
    }
}
