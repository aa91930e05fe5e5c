use super::context::AppContext;
use super::ui::progress_bar;
use crate::output::Output;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use showtrack_backend::{OrderBy, QuerySpec};
use showtrack_core::{encode_show_name, DashboardSummary, TableQuery};
use showtrack_models::Episode;

pub async fn run_dashboard(output: &Output) -> Result<()> {
    let mut ctx = AppContext::load().await?;
    let table = ctx.tables().episodes.clone();

    let query = ctx
        .fetch(output, "episodes", |api| {
            TableQuery::<Episode>::new(api, QuerySpec::new(&table).order_by(OrderBy::asc("Show")).all_rows())
        })
        .await?;

    let summary = DashboardSummary::from_episodes(query.data().unwrap_or_default(), Some(query.total_count()));
    tracing::info!(
        operation = "dashboard",
        total_episodes = summary.total_episodes,
        watched = summary.watched_episodes,
        shows = summary.total_shows,
        "Dashboard loaded"
    );

    if !output.is_human() {
        output.json(&serde_json::to_value(&summary)?);
        return Ok(());
    }

    if let Some(user) = ctx.auth.user() {
        output.println(format!("{}", user.email.as_deref().unwrap_or(&user.id).bright_black()));
    }

    let mut stats = Table::new();
    stats.load_preset(comfy_table::presets::UTF8_FULL);
    stats.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    stats.set_header(vec![
        Cell::new("Total Episodes").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Watched").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Shows").add_attribute(comfy_table::Attribute::Bold),
    ]);
    stats.add_row(vec![
        Cell::new(summary.total_episodes),
        Cell::new(format!("{} ({}%)", summary.watched_episodes, summary.watched_percentage)),
        Cell::new(summary.total_shows),
    ]);
    output.table(&stats);

    output.println(format!(
        "Watching: {}   Not started: {}   Finished: {}",
        summary.categories.watching, summary.categories.not_started, summary.categories.stopped
    ));
    output.println("");

    if summary.shows.is_empty() {
        output.info("No episodes yet.");
        return Ok(());
    }

    output.println(format!("{}", "Show Progress".bright_cyan().bold()));
    let mut progress = Table::new();
    progress.load_preset(comfy_table::presets::NOTHING);
    for show in &summary.shows {
        progress.add_row(vec![
            Cell::new(&show.show),
            Cell::new(progress_bar(show.watched, show.total, 24)).fg(comfy_table::Color::Magenta),
            Cell::new(format!("{} / {} episodes", show.watched, show.total)),
        ]);
    }
    output.table(&progress);

    if let Some(first) = summary.shows.first() {
        output.println(format!(
            "\nRun 'showtrack show {}' to see the episodes of a show.",
            encode_show_name(&first.show)
        ));
    }
    Ok(())
}
