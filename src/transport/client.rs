//! HTTP API client.
//!
//! Every outbound request carries the language tag and, when a credential is
//! stored, a bearer header. An authorization failure triggers exactly one
//! silent refresh; concurrent failing requests queue behind it and replay
//! once the rotated token lands. A failed refresh logs the session out and
//! flips the observable session state to `LoginRequired`.

use std::sync::Arc;
use std::time::Duration;

use prenota_api_types::{Credential, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, Role};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};
use url::Url;

use crate::session::CredentialStore;
use crate::sync::{Locale, SyncError, SyncResult};

use super::error::TransportError;

/// Boundary view of the authentication lifecycle, for the router/view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Active,
    /// Refresh failed; the hosting app must redirect to its login entry.
    LoginRequired,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    locale: Locale,
    credentials: Arc<CredentialStore>,
    refresh_gate: Mutex<()>,
    session: watch::Sender<SessionState>,
}

impl ApiClient {
    pub fn new(
        base: Url,
        locale: Locale,
        timeout: Duration,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, TransportError> {
        // joining relative paths requires a trailing slash on the base
        let mut base = base;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let initial = if credentials.current().is_some() {
            SessionState::Active
        } else {
            SessionState::LoggedOut
        };
        let (session, _) = watch::channel(initial);
        Ok(Self { http, base, locale, credentials, refresh_gate: Mutex::new(()), session })
    }

    pub fn session_watch(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.current().is_some()
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    // ========================================================================
    // Public (unauthenticated) and authenticated request surface
    // ========================================================================

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> SyncResult<Value> {
        let token = self.credentials.current().map(|c| c.access_token);
        self.execute(Method::GET, path, query, None, token.as_deref())
            .await
            .map_err(|e| map_transport(e, false))
    }

    pub async fn get_authed(&self, path: &str, query: &[(String, String)]) -> SyncResult<Value> {
        self.request_authed(Method::GET, path, query, None, false).await
    }

    pub async fn post_authed(&self, path: &str, body: Option<&Value>) -> SyncResult<Value> {
        self.request_authed(Method::POST, path, &[], body, true).await
    }

    pub async fn delete_authed(&self, path: &str) -> SyncResult<Value> {
        self.request_authed(Method::DELETE, path, &[], None, true).await
    }

    pub async fn login(&self, email: &str, password: &str) -> SyncResult<Role> {
        let request = LoginRequest { email: email.to_string(), password: password.to_string() };
        let body = serde_json::to_value(&request).unwrap_or(Value::Null);
        let value = self
            .execute(Method::POST, "/auth/login", &[], Some(&body), None)
            .await
            .map_err(|e| map_transport(e, true))?;
        let response: LoginResponse =
            serde_json::from_value(value).map_err(|e| SyncError::decode(e.to_string()))?;

        let role = response.role;
        self.credentials.set(Credential::from(response)).await;
        let _ = self.session.send(SessionState::Active);
        debug!(?role, "session established");
        Ok(role)
    }

    pub async fn logout(&self) {
        self.credentials.clear().await;
        let _ = self.session.send(SessionState::LoggedOut);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn request_authed(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        mutating: bool,
    ) -> SyncResult<Value> {
        let Some(credential) = self.credentials.current() else {
            return Err(SyncError::CredentialMissing);
        };

        let first = self
            .execute(method.clone(), path, query, body, Some(&credential.access_token))
            .await;
        let settled = match first {
            Err(TransportError::Unauthorized) => {
                let token = self.refresh(&credential).await?;
                self.execute(method, path, query, body, Some(&token)).await
            }
            other => other,
        };
        settled.map_err(|e| map_transport(e, mutating))
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value, TransportError> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;

        let mut request = self
            .http
            .request(method, url)
            .query(&[("lang", self.locale.as_str())])
            .query(query);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), message });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Rotate the credential after an authorization failure.
    ///
    /// Callers serialize on the gate; whoever enters after a successful
    /// rotation sees a token differing from its stale one and replays
    /// without issuing another refresh call.
    async fn refresh(&self, stale: &Credential) -> SyncResult<String> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.credentials.current()
            && current.access_token != stale.access_token
        {
            return Ok(current.access_token);
        }

        let request = RefreshRequest { refresh_token: stale.refresh_token.clone() };
        let body = serde_json::to_value(&request).unwrap_or(Value::Null);
        let outcome = self
            .execute(Method::POST, "/auth/refresh", &[], Some(&body), None)
            .await
            .and_then(|value| {
                serde_json::from_value::<RefreshResponse>(value)
                    .map_err(|e| TransportError::Decode(e.to_string()))
            });

        match outcome {
            Ok(payload) => {
                let rotated = Credential {
                    access_token: payload.access_token.clone(),
                    refresh_token: payload.refresh_token,
                    role: stale.role,
                };
                self.credentials.set(rotated).await;
                debug!("credential refreshed");
                Ok(payload.access_token)
            }
            Err(error) => {
                warn!(%error, "credential refresh failed, login required");
                self.credentials.clear().await;
                let _ = self.session.send(SessionState::LoginRequired);
                Err(SyncError::AuthExpired)
            }
        }
    }
}

fn map_transport(error: TransportError, mutating: bool) -> SyncError {
    match error {
        TransportError::Unauthorized => SyncError::AuthExpired,
        TransportError::Decode(message) => SyncError::Decode(message),
        error if mutating => SyncError::from(error),
        error => SyncError::network(error.to_string()),
    }
}
