use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const PLACEHOLDER_URL: &str = "https://YOUR_PROJECT.supabase.co";
const PLACEHOLDER_KEY: &str = "YOUR_ANON_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub tables: TableNames,
    #[serde(default)]
    pub display: DisplayOptions,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Connection settings for the hosted backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL, e.g. https://abcd.supabase.co
    pub url: String,
    /// Public (anon) API key sent with every request
    pub anon_key: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Collection names; the defaults match the hosted project layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableNames {
    #[serde(default = "default_episodes_table")]
    pub episodes: String,
    #[serde(default = "default_lists_table")]
    pub lists: String,
    #[serde(default = "default_list_items_table")]
    pub list_items: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayOptions {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

/// What a failed fetch or mutation does besides recording the error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the error for the caller to render
    #[default]
    Surface,
    /// Record the error and send the session back to sign-in on any failure
    RedirectToSignIn,
    /// Send the session back to sign-in only when the backend rejects the credentials
    RedirectOnAuthFailure,
}

impl ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Surface => "surface",
            ErrorPolicy::RedirectToSignIn => "redirect_to_sign_in",
            ErrorPolicy::RedirectOnAuthFailure => "redirect_on_auth_failure",
        }
    }
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "surface" => Ok(ErrorPolicy::Surface),
            "redirect_to_sign_in" | "redirect" => Ok(ErrorPolicy::RedirectToSignIn),
            "redirect_on_auth_failure" | "auth" => Ok(ErrorPolicy::RedirectOnAuthFailure),
            other => Err(format!(
                "Invalid error policy: {}. Use surface, redirect_to_sign_in or redirect_on_auth_failure",
                other
            )),
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_episodes_table() -> String {
    "tvshow".to_string()
}

fn default_lists_table() -> String {
    "lists".to_string()
}

fn default_list_items_table() -> String {
    "list_items".to_string()
}

fn default_page_size() -> u32 {
    10
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            episodes: default_episodes_table(),
            lists: default_lists_table(),
            list_items: default_list_items_table(),
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: PLACEHOLDER_URL.to_string(),
            anon_key: PLACEHOLDER_KEY.to_string(),
            schema: default_schema(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            tables: TableNames::default(),
            display: DisplayOptions::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `SHOWTRACK_URL` / `SHOWTRACK_ANON_KEY` overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SHOWTRACK_URL") {
            if !url.trim().is_empty() {
                self.backend.url = url.trim().to_string();
            }
        }
        if let Ok(key) = std::env::var("SHOWTRACK_ANON_KEY") {
            if !key.trim().is_empty() {
                self.backend.anon_key = key.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.backend.url.trim();
        if url.is_empty() || url == PLACEHOLDER_URL {
            return Err(anyhow::anyhow!("backend.url is not configured"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!("backend.url must start with http:// or https://: {}", url));
        }
        if self.backend.anon_key.trim().is_empty() || self.backend.anon_key == PLACEHOLDER_KEY {
            return Err(anyhow::anyhow!("backend.anon_key is not configured"));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("backend.request_timeout_secs must be greater than zero"));
        }
        if self.display.page_size == 0 {
            return Err(anyhow::anyhow!("display.page_size must be greater than zero"));
        }
        if self.realtime.heartbeat_secs == 0 {
            return Err(anyhow::anyhow!("realtime.heartbeat_secs must be greater than zero"));
        }
        for (field, name) in [
            ("tables.episodes", &self.tables.episodes),
            ("tables.lists", &self.tables.lists),
            ("tables.list_items", &self.tables.list_items),
        ] {
            if name.trim().is_empty() {
                return Err(anyhow::anyhow!("{} cannot be empty", field));
            }
        }
        Ok(())
    }

    pub fn is_backend_configured(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn configured() -> Config {
        Config {
            backend: BackendConfig {
                url: "https://abcd.supabase.co".to_string(),
                anon_key: "anon".to_string(),
                ..BackendConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let mut config = configured();
        config.display.page_size = 25;
        config.display.error_policy = ErrorPolicy::RedirectOnAuthFailure;

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.backend.url, "https://abcd.supabase.co");
        assert_eq!(loaded.display.page_size, 25);
        assert_eq!(loaded.display.error_policy, ErrorPolicy::RedirectOnAuthFailure);
        assert_eq!(loaded.tables, TableNames::default());
    }

    #[test]
    fn test_config_defaults_from_minimal_file() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            url = "https://abcd.supabase.co"
            anon_key = "anon"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.schema, "public");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.tables.episodes, "tvshow");
        assert_eq!(config.display.page_size, 10);
        assert_eq!(config.display.error_policy, ErrorPolicy::Surface);
        assert_eq!(config.realtime.heartbeat_secs, 30);
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
        assert!(!config.is_backend_configured());

        config = configured();
        assert!(config.validate().is_ok());

        config.display.page_size = 0;
        assert!(config.validate().is_err());

        config = configured();
        config.backend.url = "abcd.supabase.co".to_string();
        assert!(config.validate().is_err());

        config = configured();
        config.tables.lists = " ".to_string();
        assert!(config.validate().is_err());

        config = configured();
        config.backend.request_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "backend.request_timeout_secs must be greater than zero");
    }

    #[test]
    fn test_error_policy_snake_case() {
        let policy: ErrorPolicy = toml::from_str::<DisplayOptions>("error_policy = \"redirect_to_sign_in\"")
            .unwrap()
            .error_policy;
        assert_eq!(policy, ErrorPolicy::RedirectToSignIn);
    }

    #[test]
    fn test_error_policy_from_str() {
        assert_eq!("surface".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Surface));
        assert_eq!("redirect-on-auth-failure".parse::<ErrorPolicy>(), Ok(ErrorPolicy::RedirectOnAuthFailure));
        assert_eq!(ErrorPolicy::RedirectToSignIn.to_string().parse::<ErrorPolicy>(), Ok(ErrorPolicy::RedirectToSignIn));
        assert!("sometimes".parse::<ErrorPolicy>().is_err());
    }
}
