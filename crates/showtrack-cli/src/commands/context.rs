use super::{auth, prompts, ui};
use crate::output::Output;
use color_eyre::Result;
use serde::de::DeserializeOwned;
use showtrack_backend::{AuthClient, DataApi, RealtimeClient, RestClient};
use showtrack_config::{Config, CredentialStore, ErrorPolicy, PathManager, TableNames};
use showtrack_core::{AuthSession, TableQuery};
use std::sync::Arc;
use std::time::Duration;

/// Load the configuration file with environment overrides applied, and validate it
pub fn load_config(path_manager: &PathManager) -> Result<Config> {
    let config_file = path_manager.config_file();
    if !config_file.exists() {
        return Err(color_eyre::eyre::eyre!(
            "Configuration file not found at {}. Run 'showtrack config init' to create it.",
            config_file.display()
        ));
    }

    let mut config = Config::load_from_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

/// Everything a command needs to talk to the backend as the current user
pub struct AppContext {
    pub config: Config,
    pub paths: PathManager,
    pub auth: AuthSession,
}

impl AppContext {
    /// Load configuration and restore the saved session, if any
    pub async fn load() -> Result<Self> {
        let paths = PathManager::default();
        let config = load_config(&paths)?;

        let auth_client = AuthClient::new(&config.backend.url, &config.backend.anon_key)
            .with_timeout(Duration::from_secs(config.backend.request_timeout_secs));
        let store = CredentialStore::new(paths.credentials_file());
        let mut auth = AuthSession::new(Arc::new(auth_client), store);
        match auth.restore().await {
            Ok(Some(user)) => tracing::debug!(user_id = %user.id, "Restored session"),
            Ok(None) => tracing::debug!("No session; requests use the anon key"),
            Err(e) => tracing::warn!(error = %e, "Could not restore session"),
        }

        Ok(Self { config, paths, auth })
    }

    pub fn tables(&self) -> &TableNames {
        &self.config.tables
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.config.display.error_policy
    }

    /// Row API client carrying the current access token
    pub fn data_api(&self) -> Arc<dyn DataApi> {
        Arc::new(
            RestClient::new(&self.config.backend.url, &self.config.backend.anon_key)
                .with_timeout(Duration::from_secs(self.config.backend.request_timeout_secs))
                .with_schema(&self.config.backend.schema)
                .with_access_token(self.auth.access_token()),
        )
    }

    pub fn realtime(&self) -> RealtimeClient {
        RealtimeClient::new(&self.config.backend.url, &self.config.backend.anon_key)
            .with_access_token(self.auth.access_token())
            .with_heartbeat(Duration::from_secs(self.config.realtime.heartbeat_secs))
    }

    /// React to a component asking for a fresh sign-in. Returns true when the
    /// user signed in again and the caller should retry.
    pub async fn redirect_to_sign_in(&mut self, output: &Output) -> Result<bool> {
        output.warn("Your session is no longer valid.");
        if !(output.is_human() && ui::is_interactive()) {
            return Err(color_eyre::eyre::eyre!(
                "Sign-in required. Run 'showtrack auth login' and try again."
            ));
        }
        if !prompts::prompt_yes_no("Sign in now?", Some(true))? {
            return Ok(false);
        }
        auth::sign_in_interactive(&mut self.auth, None, true, output).await?;
        Ok(true)
    }

    /// Build a query against the current session, fetch it behind a spinner,
    /// and retry once after a sign-in when the query asks for one
    pub async fn fetch<T, F>(&mut self, output: &Output, what: &str, make: F) -> Result<TableQuery<T>>
    where
        T: DeserializeOwned,
        F: Fn(Arc<dyn DataApi>) -> TableQuery<T>,
    {
        let mut query = make(self.data_api()).with_error_policy(self.error_policy());
        let spinner = ui::Spinner::start(&format!("Loading {}...", what), output.is_human() && !output.is_quiet());
        query.fetch().await;
        spinner.finish();

        if query.needs_sign_in() && self.redirect_to_sign_in(output).await? {
            query = make(self.data_api()).with_error_policy(self.error_policy());
            query.fetch().await;
        }

        if let Some(error) = query.error() {
            return Err(color_eyre::eyre::eyre!("Failed to load {}: {}", what, error));
        }
        Ok(query)
    }
}
