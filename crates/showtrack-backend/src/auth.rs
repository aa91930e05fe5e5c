use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use showtrack_models::{Session, User};
use std::sync::Arc;
use tracing::{debug, info};
use crate::error::{error_from_response, BackendError, Result};
use crate::rest::create_http_client;
use crate::traits::AuthApi;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        // Prefer the absolute expiry when the server sends one
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Result of a sign-up: projects with email confirmation return only the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user: User,
    pub session: Option<Session>,
}

impl SignUpOutcome {
    pub fn needs_confirmation(&self) -> bool {
        self.session.is_none()
    }
}

/// Auth API client (`{url}/auth/v1`)
#[derive(Clone)]
pub struct AuthClient {
    client: Arc<Client>,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client: Arc::new(create_http_client(std::time::Duration::from_secs(30))),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = Arc::new(create_http_client(timeout));
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn token_request(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let response = self
            .client
            .post(self.endpoint("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Authentication failed").await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.into_session())
    }
}

/// Decode a sign-up body, which is either a full token response or a bare user
fn parse_sign_up(body: serde_json::Value) -> Result<SignUpOutcome> {
    if body.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(body)?;
        let session = token.into_session();
        return Ok(SignUpOutcome {
            user: session.user.clone(),
            session: Some(session),
        });
    }

    let user_value = body.get("user").cloned().unwrap_or(body);
    let user: User = serde_json::from_value(user_value)?;
    Ok(SignUpOutcome { user, session: None })
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        let response = self
            .client
            .post(self.endpoint("signup"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Sign-up failed").await);
        }

        let body: serde_json::Value = response.json().await?;
        let outcome = parse_sign_up(body)?;
        info!(user_id = %outcome.user.id, confirmed = !outcome.needs_confirmation(), "Signed up");
        Ok(outcome)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .token_request("password", serde_json::json!({ "email": email, "password": password }))
            .await?;
        info!(user_id = %session.user.id, expires_at = %session.expires_at, "Signed in");
        Ok(session)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let session = self
            .token_request("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await?;
        debug!(expires_at = %session.expires_at, "Refreshed session");
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Sign-out failed").await);
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<User> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to get user").await);
        }

        response.json::<User>().await.map_err(BackendError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_requests_honour_configured_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = AuthClient::new(format!("http://{}", addr), "anon")
            .with_timeout(std::time::Duration::from_millis(200));
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.sign_in_with_password("viewer@example.com", "secret"),
        )
        .await
        .expect("request should time out on its own");
        assert!(result.is_err());
    }

    #[test]
    fn test_sign_up_with_session() {
        let outcome = parse_sign_up(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "refresh_token": "r1",
            "user": { "id": "u1", "email": "viewer@example.com", "created_at": "2024-01-01T00:00:00Z" }
        }))
        .unwrap();

        assert!(!outcome.needs_confirmation());
        let session = outcome.session.unwrap();
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(outcome.user.email.as_deref(), Some("viewer@example.com"));
    }

    #[test]
    fn test_sign_up_pending_confirmation() {
        let outcome = parse_sign_up(json!({
            "id": "u2",
            "email": "new@example.com",
            "confirmation_sent_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(outcome.needs_confirmation());
        assert_eq!(outcome.user.id, "u2");
    }

    #[test]
    fn test_token_response_relative_expiry() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt",
            "refresh_token": "r1",
            "expires_in": 3600,
            "user": { "id": "u1" }
        }))
        .unwrap();
        let session = token.into_session();
        let remaining = session.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 3500 && remaining.num_seconds() <= 3600);
    }
}
