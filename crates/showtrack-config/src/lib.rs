pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{BackendConfig, Config, DisplayOptions, ErrorPolicy, RealtimeConfig, TableNames};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
