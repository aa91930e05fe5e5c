use super::context::AppContext;
use crate::output::Output;
use color_eyre::Result;
use comfy_table::{Cell, Color, Table};
use serde_json::{json, Value};
use showtrack_backend::{Filter, FilterOperator, OrderBy, QuerySpec};
use showtrack_core::{decode_show_name, TableQuery};
use showtrack_models::Episode;

pub struct EpisodeArgs {
    pub page: u32,
    pub page_size: Option<u32>,
    pub show: Option<String>,
    pub watched: Option<bool>,
    pub filters: Vec<String>,
    pub sort: String,
    pub desc: bool,
}

/// Parse `column=operator.value` (the REST filter syntax)
pub fn parse_filter(raw: &str) -> Result<Filter> {
    let (column, rest) = raw
        .split_once('=')
        .ok_or_else(|| color_eyre::eyre::eyre!("Invalid filter '{}': expected column=operator.value", raw))?;
    let (operator, value) = rest
        .split_once('.')
        .ok_or_else(|| color_eyre::eyre::eyre!("Invalid filter '{}': expected column=operator.value", raw))?;

    let column = column.trim();
    if column.is_empty() {
        return Err(color_eyre::eyre::eyre!("Invalid filter '{}': missing column", raw));
    }
    let operator: FilterOperator = operator
        .parse()
        .map_err(|e: String| color_eyre::eyre::eyre!("Invalid filter '{}': {}", raw, e))?;

    let value = match operator {
        FilterOperator::In => {
            let inner = value.trim().trim_start_matches('(').trim_end_matches(')');
            Value::Array(inner.split(',').map(|v| json!(v.trim())).collect())
        }
        FilterOperator::Is => match value.trim() {
            "null" => Value::Null,
            "true" => json!(true),
            "false" => json!(false),
            other => json!(other),
        },
        _ => json!(value),
    };
    Ok(Filter::new(column, operator, value))
}

pub fn build_spec(table: &str, args: &EpisodeArgs, default_page_size: u32) -> Result<QuerySpec> {
    let page_size = args.page_size.unwrap_or(default_page_size);
    if page_size == 0 {
        return Err(color_eyre::eyre::eyre!("--page-size must be greater than zero"));
    }

    let order = if args.desc {
        OrderBy::desc(&args.sort)
    } else {
        OrderBy::asc(&args.sort)
    };
    let mut spec = QuerySpec::new(table).order_by(order).page(args.page.max(1), page_size);

    if let Some(show) = &args.show {
        spec = spec.filter(Filter::eq("Show", decode_show_name(show)));
    }
    if let Some(watched) = args.watched {
        spec = spec.filter(Filter::eq("Watched", watched));
    }
    for raw in &args.filters {
        spec = spec.filter(parse_filter(raw)?);
    }
    Ok(spec)
}

pub async fn run_episodes(args: EpisodeArgs, output: &Output) -> Result<()> {
    let mut ctx = AppContext::load().await?;
    let spec = build_spec(&ctx.tables().episodes, &args, ctx.config.display.page_size)?;

    let query = ctx
        .fetch(output, "episodes", |api| TableQuery::<Episode>::new(api, spec.clone()))
        .await?;
    let episodes = query.data().unwrap_or_default();

    if !output.is_human() {
        output.json(&json!({
            "page": query.current_page(),
            "total_pages": query.total_pages(),
            "total_count": query.total_count(),
            "episodes": episodes,
        }));
        return Ok(());
    }

    if episodes.is_empty() {
        if query.total_count() > 0 {
            output.info(format!(
                "Page {} is past the end ({} page(s) in total).",
                query.current_page(),
                query.total_pages()
            ));
        } else {
            output.info("No episodes match.");
        }
        return Ok(());
    }

    output.table(&episode_table(episodes, true));
    output.println(format!(
        "Page {} of {} · {} episode(s)",
        query.current_page(),
        query.total_pages(),
        query.total_count()
    ));
    if u64::from(query.current_page()) < query.total_pages() {
        output.println(format!("Next: showtrack episodes --page {}", query.current_page() + 1));
    }
    Ok(())
}

/// Episodes as a table; `with_show` adds the show column
pub fn episode_table(episodes: &[Episode], with_show: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    let mut header = Vec::new();
    if with_show {
        header.push("Show");
    }
    header.extend(["Episode", "Title", "Air Date", "Watched"]);
    table.set_header(header);

    for episode in episodes {
        let air_date = episode
            .air_date_parsed()
            .map(|d| d.format("%b %-d, %Y").to_string())
            .unwrap_or_else(|| episode.air_date.clone());
        let watched = if episode.watched {
            Cell::new("✓").fg(Color::Green)
        } else {
            Cell::new("✗").fg(Color::Yellow)
        };

        let mut row = Vec::new();
        if with_show {
            row.push(Cell::new(&episode.show));
        }
        row.push(Cell::new(&episode.episode));
        row.push(Cell::new(&episode.title));
        row.push(Cell::new(air_date));
        row.push(watched);
        table.add_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EpisodeArgs {
        EpisodeArgs {
            page: 2,
            page_size: None,
            show: Some("BreakingBad".to_string()),
            watched: Some(false),
            filters: vec!["Air Date=gte.2008-01-01".to_string()],
            sort: "Episode".to_string(),
            desc: true,
        }
    }

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter("Show=eq.Breaking Bad").unwrap();
        assert_eq!(filter.column, "Show");
        assert_eq!(filter.operator, FilterOperator::Eq);
        assert_eq!(filter.value, json!("Breaking Bad"));

        let filter = parse_filter("Episode=in.(S01E01,S01E02)").unwrap();
        assert_eq!(filter.value, json!(["S01E01", "S01E02"]));

        let filter = parse_filter("status=is.null").unwrap();
        assert_eq!(filter.value, Value::Null);

        // Values may themselves contain dots
        let filter = parse_filter("Title=ilike.*Dr. Who*").unwrap();
        assert_eq!(filter.value, json!("*Dr. Who*"));

        assert!(parse_filter("Show").is_err());
        assert!(parse_filter("Show=eq").is_err());
        assert!(parse_filter("Show=near.Dark").is_err());
    }

    #[test]
    fn test_build_spec() {
        let spec = build_spec("tvshow", &args(), 10).unwrap();
        assert_eq!(spec.row_range(), Some((10, 19)));
        assert_eq!(spec.filters.len(), 3);
        assert_eq!(spec.filters[0], Filter::eq("Show", "Breaking Bad"));
        assert_eq!(spec.filters[1], Filter::eq("Watched", false));
        assert_eq!(spec.order, Some(OrderBy::desc("Episode")));

        let mut zero = args();
        zero.page_size = Some(0);
        assert!(build_spec("tvshow", &zero, 10).is_err());
    }
}
