use crate::output::Output;
use color_eyre::Result;
use showtrack_config::PathManager;
use std::fs;

pub async fn run_clear(all: bool, credentials: bool, logs: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();

    if all {
        clear_credentials(&path_manager, output)?;
        clear_logs(&path_manager, output)?;
        output.success("Saved session and logs cleared");
        return Ok(());
    }

    if credentials {
        clear_credentials(&path_manager, output)?;
    }
    if logs {
        clear_logs(&path_manager, output)?;
    }

    if !credentials && !logs {
        output.warn("No clear option specified. Use --credentials, --logs, or --all");
        output.println("\nExample: showtrack clear --credentials");
    }
    Ok(())
}

fn clear_credentials(path_manager: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = path_manager.credentials_file();

    if credentials_file.exists() {
        fs::remove_file(&credentials_file)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to remove credentials file at {}: {}", credentials_file.display(), e))?;
        output.success(format!("Cleared saved session: {}", credentials_file.display()));
    } else {
        output.info("No saved session found to clear");
    }
    Ok(())
}

fn clear_logs(path_manager: &PathManager, output: &Output) -> Result<()> {
    let log_dir = path_manager.log_dir();

    if log_dir.exists() {
        fs::remove_dir_all(log_dir)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to remove logs at {}: {}", log_dir.display(), e))?;
        output.success(format!("Cleared logs: {}", log_dir.display()));
    } else {
        output.info("No logs found to clear");
    }
    Ok(())
}
