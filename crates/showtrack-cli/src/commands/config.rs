use super::{prompts, ui};
use crate::output::{Output, OutputFormat};
use crate::ConfigCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use serde_json::json;
use showtrack_config::{Config, ErrorPolicy, PathManager};

pub async fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, output),
        ConfigCommands::Set { key, value } => set_config(&key, &value, output),
        ConfigCommands::Init { url, anon_key, force } => init_config(url, anon_key, force, output),
    }
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();

    if !config_file.exists() {
        output.warn(format!("Configuration file not found at: {}", config_file.display()));
        output.info("Run 'showtrack config init' to create it.");
        return Ok(());
    }

    let config = Config::load_from_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    let anon_key = if full {
        config.backend.anon_key.clone()
    } else {
        mask_string(&config.backend.anon_key)
    };

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }
            output.println(format!("{}", "Configuration".bright_cyan().bold()));

            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
            table.set_header(vec![
                Cell::new("Setting").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").add_attribute(comfy_table::Attribute::Bold),
            ]);
            let configured = if config.is_backend_configured() {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            };
            for (key, value) in [
                ("config file", config_file.display().to_string()),
                ("configured", configured),
                ("backend.url", config.backend.url.clone()),
                ("backend.anon_key", anon_key),
                ("backend.schema", config.backend.schema.clone()),
                ("backend.request_timeout_secs", config.backend.request_timeout_secs.to_string()),
                ("tables.episodes", config.tables.episodes.clone()),
                ("tables.lists", config.tables.lists.clone()),
                ("tables.list_items", config.tables.list_items.clone()),
                ("display.page_size", config.display.page_size.to_string()),
                ("display.error_policy", config.display.error_policy.to_string()),
                ("realtime.heartbeat_secs", config.realtime.heartbeat_secs.to_string()),
            ] {
                table.add_row(vec![Cell::new(key), Cell::new(value)]);
            }
            output.table(&table);
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let mut value = serde_json::to_value(&config)?;
            value["backend"]["anon_key"] = json!(anon_key);
            output.json(&json!({
                "config_file": config_file.display().to_string(),
                "configured": config.is_backend_configured(),
                "config": value,
            }));
        }
    }
    Ok(())
}

fn set_config(key: &str, value: &str, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();
    let mut config = if config_file.exists() {
        Config::load_from_file(&config_file)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?
    } else {
        Config::default()
    };

    apply_setting(&mut config, key, value)?;
    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;

    tracing::info!(operation = "config_set", key = key, "Configuration updated");
    let shown = if key == "backend.anon_key" { mask_string(value) } else { value.to_string() };
    output.success(format!("Set {} = {}", key, shown));
    Ok(())
}

/// Set one dotted `key` on `config`, parsing `value` for the field's type
pub fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    let non_empty = |field: &str| -> Result<String> {
        if value.is_empty() {
            return Err(color_eyre::eyre::eyre!("{} cannot be empty", field));
        }
        Ok(value.to_string())
    };
    let positive = |field: &str| -> Result<u64> {
        match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(color_eyre::eyre::eyre!("{} must be a positive number, got '{}'", field, value)),
        }
    };

    match key {
        "backend.url" => {
            let url = non_empty(key)?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(color_eyre::eyre::eyre!("backend.url must start with http:// or https://"));
            }
            config.backend.url = url.trim_end_matches('/').to_string();
        }
        "backend.anon_key" => config.backend.anon_key = non_empty(key)?,
        "backend.schema" => config.backend.schema = non_empty(key)?,
        "backend.request_timeout_secs" => config.backend.request_timeout_secs = positive(key)?,
        "tables.episodes" => config.tables.episodes = non_empty(key)?,
        "tables.lists" => config.tables.lists = non_empty(key)?,
        "tables.list_items" => config.tables.list_items = non_empty(key)?,
        "display.page_size" => {
            config.display.page_size = u32::try_from(positive(key)?)
                .map_err(|_| color_eyre::eyre::eyre!("display.page_size is too large"))?
        }
        "display.error_policy" => {
            config.display.error_policy = value
                .parse::<ErrorPolicy>()
                .map_err(|e| color_eyre::eyre::eyre!(e))?
        }
        "realtime.heartbeat_secs" => config.realtime.heartbeat_secs = positive(key)?,
        other => return Err(color_eyre::eyre::eyre!("Unknown setting '{}'", other)),
    }
    Ok(())
}

fn init_config(url: Option<String>, anon_key: Option<String>, force: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();

    if config_file.exists() && !force {
        return Err(color_eyre::eyre::eyre!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_file.display()
        ));
    }

    let interactive = output.is_human() && ui::is_interactive();
    let url = match url {
        Some(url) => url,
        None if interactive => prompts::prompt_required("Project URL")?,
        None => return Err(color_eyre::eyre::eyre!("--url is required when not running interactively")),
    };
    let anon_key = match anon_key {
        Some(key) => key,
        None if interactive => prompts::prompt_required("Anon key")?,
        None => return Err(color_eyre::eyre::eyre!("--anon-key is required when not running interactively")),
    };

    let mut config = Config::default();
    apply_setting(&mut config, "backend.url", &url)?;
    apply_setting(&mut config, "backend.anon_key", &anon_key)?;

    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;
    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;

    output.success(format!("Configuration written to {}", config_file.display()));
    output.info("Next: 'showtrack auth login' to sign in.");
    Ok(())
}

fn mask_string(s: &str) -> String {
    if s.is_empty() || s == "YOUR_ANON_KEY" {
        return "<not set>".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}
