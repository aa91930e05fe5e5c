use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use showtrack_models::{Session, User};
use std::collections::HashMap;
use std::path::PathBuf;

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const SESSION_EXPIRES: &str = "session_expires";
const USER_ID: &str = "user_id";
const USER_EMAIL: &str = "user_email";
const USER_CREATED_AT: &str = "user_created_at";

const SESSION_KEYS: [&str; 6] = [
    ACCESS_TOKEN,
    REFRESH_TOKEN,
    SESSION_EXPIRES,
    USER_ID,
    USER_EMAIL,
    USER_CREATED_AT,
];

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

/// Flat key/value TOML file holding the persisted session
pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }

    /// Reassemble the stored session; `None` if any required piece is missing
    pub fn get_session(&self) -> Option<Session> {
        let expires_at = self
            .get(SESSION_EXPIRES)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;

        Some(Session {
            access_token: self.get(ACCESS_TOKEN)?.clone(),
            refresh_token: self.get(REFRESH_TOKEN)?.clone(),
            expires_at,
            user: User {
                id: self.get(USER_ID)?.clone(),
                email: self.get(USER_EMAIL).cloned(),
                created_at: self.get(USER_CREATED_AT).cloned(),
            },
        })
    }

    pub fn set_session(&mut self, session: &Session) {
        self.clear_session();
        self.set(ACCESS_TOKEN.to_string(), session.access_token.clone());
        self.set(REFRESH_TOKEN.to_string(), session.refresh_token.clone());
        self.set(SESSION_EXPIRES.to_string(), session.expires_at.to_rfc3339());
        self.set(USER_ID.to_string(), session.user.id.clone());
        if let Some(email) = &session.user.email {
            self.set(USER_EMAIL.to_string(), email.clone());
        }
        if let Some(created_at) = &session.user.created_at {
            self.set(USER_CREATED_AT.to_string(), created_at.clone());
        }
    }

    pub fn clear_session(&mut self) {
        for key in SESSION_KEYS {
            self.remove(key);
        }
    }

    pub fn has_session(&self) -> bool {
        self.get_session().is_some()
    }
}
