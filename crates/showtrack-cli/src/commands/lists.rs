use super::context::AppContext;
use super::{prompts, ui};
use crate::output::Output;
use crate::ListCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use serde_json::json;
use showtrack_core::{ListError, ListService};
use showtrack_models::WatchList;

pub async fn run_lists(cmd: ListCommands, output: &Output) -> Result<()> {
    require_show_when_unattended(&cmd, output.is_human() && ui::is_interactive())?;
    let mut ctx = AppContext::load().await?;

    let service = list_service(&ctx);
    match run_list_command(&service, &cmd, output).await {
        Err(e) if service.needs_sign_in(&e) => {
            if !ctx.redirect_to_sign_in(output).await? {
                return Err(list_error(e));
            }
            let service = list_service(&ctx);
            run_list_command(&service, &cmd, output).await.map_err(list_error)
        }
        other => other.map_err(list_error),
    }
}

/// `lists add` can only pick a show by prompting
fn require_show_when_unattended(cmd: &ListCommands, interactive: bool) -> Result<()> {
    if let ListCommands::Add { show: None, .. } = cmd {
        if !interactive {
            return Err(color_eyre::eyre::eyre!(
                "No show given. Pass the show name to add when not running interactively."
            ));
        }
    }
    Ok(())
}

fn list_service(ctx: &AppContext) -> ListService {
    ListService::new(ctx.data_api(), ctx.tables().clone()).with_error_policy(ctx.error_policy())
}

fn list_error(error: ListError) -> color_eyre::Report {
    color_eyre::eyre::eyre!("{}", error)
}

async fn run_list_command(service: &ListService, cmd: &ListCommands, output: &Output) -> Result<(), ListError> {
    match cmd {
        ListCommands::Ls => {
            let lists = service.lists().await?;
            show_lists(&lists, output);
        }
        ListCommands::Create { name } => {
            service.create(name).await?;
            output.success(format!("Created list '{}'", name.trim()));
        }
        ListCommands::Delete { list, yes } => {
            let list = service.resolve(list).await?;
            if !*yes && output.is_human() && ui::is_interactive() {
                let question = format!("Delete list '{}'?", list.name);
                if !prompts::prompt_yes_no(&question, Some(false)).unwrap_or(false) {
                    output.info("Cancelled");
                    return Ok(());
                }
            }
            service.delete(&list.id).await?;
            output.success(format!("Deleted list '{}'", list.name));
        }
        ListCommands::Show { list } => {
            let list = service.resolve(list).await?;
            let shows: Vec<String> = service.items(&list.id).await?.into_iter().map(|i| i.show).collect();
            show_names(&list.name, &shows, "No shows in this list yet.", output);
        }
        ListCommands::Add { list, show } => {
            let list = service.resolve(list).await?;
            let show = match show {
                Some(show) => show.trim().to_string(),
                None => match pick_available(service, &list, output).await? {
                    Some(show) => show,
                    None => return Ok(()),
                },
            };
            service.add_show(&list.id, &show).await?;
            output.success(format!("Added {} to '{}'", show, list.name));
        }
        ListCommands::Remove { list, show } => {
            let list = service.resolve(list).await?;
            service.remove_show(&list.id, show.trim()).await?;
            output.success(format!("Removed {} from '{}'", show.trim(), list.name));
        }
        ListCommands::Available { list } => {
            let list = service.resolve(list).await?;
            let shows = service.available(&list.id).await?;
            show_names(&list.name, &shows, "Every show is already in this list.", output);
        }
    }
    Ok(())
}

/// Let the user choose among the shows not yet in `list`
async fn pick_available(service: &ListService, list: &WatchList, output: &Output) -> Result<Option<String>, ListError> {
    let mut shows = service.available(&list.id).await?;
    if shows.is_empty() {
        output.info("Every show is already in this list.");
        return Ok(None);
    }
    match prompts::prompt_select(&format!("Add to '{}'", list.name), &shows) {
        Ok(Some(index)) => Ok(Some(shows.swap_remove(index))),
        Ok(None) => {
            output.info("Cancelled");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Selection failed");
            Ok(None)
        }
    }
}

fn show_lists(lists: &[WatchList], output: &Output) {
    if !output.is_human() {
        output.json(&json!(lists));
        return;
    }
    if lists.is_empty() {
        output.info("No lists yet. Create one with 'showtrack lists create <name>'.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec!["Name", "Id", "Created"]);
    for list in lists {
        let created = list
            .created_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![Cell::new(&list.name), Cell::new(&list.id), Cell::new(created)]);
    }
    output.table(&table);
}

fn show_names(title: &str, shows: &[String], empty: &str, output: &Output) {
    if !output.is_human() {
        output.json(&json!({ "list": title, "shows": shows }));
        return;
    }
    output.println(format!("{}", title.bright_cyan().bold()));
    if shows.is_empty() {
        output.info(empty);
        return;
    }
    for show in shows {
        output.println(format!("  • {}", show));
    }
}
