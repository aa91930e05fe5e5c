use super::context::AppContext;
use super::episodes::episode_table;
use super::{prompts, ui};
use crate::output::Output;
use chrono::NaiveDate;
use color_eyre::Result;
use owo_colors::OwoColorize;
use serde_json::json;
use showtrack_core::{decode_show_name, listen, RefreshSignal, ShowDetails};
use showtrack_models::{EpisodeEdit, EpisodeKey, ShowStatus};

/// Fetch one show, retrying once after a sign-in when the error policy asks for it
async fn load_details(ctx: &mut AppContext, name: &str, output: &Output) -> Result<ShowDetails> {
    let show = decode_show_name(name);
    let table = ctx.tables().episodes.clone();

    let mut details = ShowDetails::new(ctx.data_api(), &table, &show).with_error_policy(ctx.error_policy());
    let spinner = ui::Spinner::start(&format!("Loading {}...", show), output.is_human() && !output.is_quiet());
    details.fetch().await;
    spinner.finish();

    if details.query().needs_sign_in() && ctx.redirect_to_sign_in(output).await? {
        details = ShowDetails::new(ctx.data_api(), &table, &show).with_error_policy(ctx.error_policy());
        details.fetch().await;
    }

    if let Some(error) = details.query().error() {
        return Err(color_eyre::eyre::eyre!("Failed to load {}: {}", show, error));
    }
    Ok(details)
}

fn render(details: &ShowDetails, output: &Output) {
    let progress = details.progress();

    if !output.is_human() {
        output.json(&json!({
            "show": details.show(),
            "watched": progress.watched,
            "total": progress.total,
            "percentage": progress.percentage(),
            "episodes": details.episodes(),
        }));
        return;
    }

    output.println(format!("{}", details.show().bright_cyan().bold()));
    output.println(format!(
        "{} {}/{} watched ({}%)",
        ui::progress_bar(progress.watched, progress.total, 30),
        progress.watched,
        progress.total,
        progress.percentage()
    ));

    if details.episodes().is_empty() {
        output.info(format!("No episodes found for '{}'.", details.show()));
        return;
    }
    output.table(&episode_table(details.episodes(), false));
}

pub async fn run_show(name: &str, follow: bool, output: &Output) -> Result<()> {
    let mut ctx = AppContext::load().await?;
    let mut details = load_details(&mut ctx, name, output).await?;
    render(&details, output);

    if !follow {
        return Ok(());
    }

    let realtime = ctx.realtime();
    let request = details.subscription().schema(&ctx.config.backend.schema);
    let signal = RefreshSignal::new();
    let mut refresh = signal.subscribe();
    let notifier = signal.clone();
    let handle = listen(&realtime, request, move |change| {
        notifier.notify(&change);
    })
    .await
    .map_err(|e| color_eyre::eyre::eyre!("Failed to subscribe to changes: {}", e))?;

    output.println(format!("{}", "Watching for changes. Press Ctrl+C to stop.".bright_black()));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(operation = "follow", show = %details.show(), "Interrupted");
                break;
            }
            changed = refresh.changed() => {
                let Some(event) = changed else { break };
                tracing::debug!(event = %event, show = %details.show(), "Refreshing after change");
                details.fetch().await;
                match details.query().error() {
                    Some(error) => output.error(format!("Refresh failed: {}", error)),
                    None => {
                        output.println("");
                        render(&details, output);
                    }
                }
            }
        }
    }

    handle.close().await;
    Ok(())
}

pub async fn run_toggle(show: &str, episode: &str, output: &Output) -> Result<()> {
    let mut ctx = AppContext::load().await?;
    let mut details = load_details(&mut ctx, show, output).await?;

    let watched = details
        .toggle_watched(episode)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to toggle {}: {}", episode, e))?;

    if output.is_human() {
        let state = if watched { "watched".green().to_string() } else { "not watched".yellow().to_string() };
        output.success(format!("{} {} marked as {}", details.show(), episode, state));
    } else {
        output.json(&json!({ "show": details.show(), "episode": episode, "watched": watched }));
    }
    Ok(())
}

/// Fill the fields not given on the command line by prompting, seeded from the episode
fn complete_edit(current: &EpisodeEdit, given: EpisodeEdit) -> Result<EpisodeEdit> {
    let episode = match given.episode {
        Some(v) => v,
        None => prompts::prompt_string("Episode", current.episode.as_deref())?,
    };
    let title = match given.title {
        Some(v) => v,
        None => prompts::prompt_string("Title", current.title.as_deref())?,
    };
    let air_date = match given.air_date {
        Some(v) => v,
        None => prompts::prompt_string("Air Date (YYYY-MM-DD)", current.air_date.as_deref())?,
    };
    let watched = match given.watched {
        Some(v) => v,
        None => prompts::prompt_yes_no("Watched?", current.watched)?,
    };
    let status = match given.status {
        Some(v) => Some(v),
        None => {
            let mut choices = vec!["(leave as is)".to_string()];
            choices.extend(ShowStatus::ALL.iter().map(|s| s.label().to_string()));
            match prompts::prompt_select("Status", &choices)? {
                Some(index) if index > 0 => Some(ShowStatus::ALL[index - 1]),
                _ => None,
            }
        }
    };

    Ok(EpisodeEdit {
        episode: Some(episode),
        title: Some(title),
        air_date: Some(air_date),
        watched: Some(watched),
        status,
        ..Default::default()
    })
}

/// Keep only the fields that differ from the current values
pub fn changed_fields(current: &EpisodeEdit, edit: EpisodeEdit) -> EpisodeEdit {
    fn keep<T: PartialEq>(new: Option<T>, old: &Option<T>) -> Option<T> {
        new.filter(|v| old.as_ref() != Some(v))
    }
    EpisodeEdit {
        show: keep(edit.show, &current.show),
        episode: keep(edit.episode, &current.episode),
        title: keep(edit.title, &current.title),
        air_date: keep(edit.air_date, &current.air_date),
        watched: keep(edit.watched, &current.watched),
        status: keep(edit.status, &current.status),
    }
}

pub fn validate_edit(edit: &EpisodeEdit) -> Result<()> {
    if let Some(code) = &edit.episode {
        if code.trim().is_empty() {
            return Err(color_eyre::eyre::eyre!("Episode code cannot be empty"));
        }
    }
    if let Some(date) = &edit.air_date {
        if !date.is_empty() && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(color_eyre::eyre::eyre!("Invalid air date '{}': expected YYYY-MM-DD", date));
        }
    }
    Ok(())
}

pub async fn run_edit(show: &str, episode: &str, given: EpisodeEdit, output: &Output) -> Result<()> {
    let mut ctx = AppContext::load().await?;
    let mut details = load_details(&mut ctx, show, output).await?;

    let current = details
        .find(episode)
        .map(EpisodeEdit::from_episode)
        .ok_or_else(|| color_eyre::eyre::eyre!("Episode {} of {} not found", episode, details.show()))?;

    let edit = if !given.is_empty() {
        given
    } else if output.is_human() && ui::is_interactive() {
        complete_edit(&current, given)?
    } else {
        return Err(color_eyre::eyre::eyre!(
            "Nothing to change. Pass --episode, --title, --air-date, --watched or --status."
        ));
    };

    let edit = changed_fields(&current, edit);
    if edit.is_empty() {
        output.info("No changes.");
        return Ok(());
    }
    validate_edit(&edit)?;

    let original = EpisodeKey::new(details.show(), episode);
    details
        .save_edit(&original, &edit)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save {}: {}", episode, e))?;

    if output.is_human() {
        output.success(format!("Saved {} {}", details.show(), edit.episode.as_deref().unwrap_or(episode)));
    } else {
        output.json(&json!({ "show": details.show(), "episode": episode, "changes": edit }));
    }
    Ok(())
}
