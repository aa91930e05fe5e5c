use super::context::AppContext;
use crate::output::Output;
use color_eyre::Result;
use owo_colors::OwoColorize;
use serde_json::Value;
use showtrack_backend::{ChangeEvent, ChangePayload, SubscriptionRequest};
use showtrack_core::listen;
use tokio::sync::mpsc;

/// One-line summary of a change for the terminal
pub fn describe_change(change: &ChangePayload) -> String {
    let row = change.record.as_ref().or(change.old_record.as_ref());
    let label = row.map(row_label).unwrap_or_default();
    let when = change.commit_timestamp.as_deref().unwrap_or("-");
    if label.is_empty() {
        format!("{} {} {}", when, change.event, change.table)
    } else {
        format!("{} {} {} {}", when, change.event, change.table, label)
    }
}

fn row_label(row: &Value) -> String {
    let field = |name: &str| row.get(name).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    match (field("Show"), field("Episode")) {
        (Some(show), Some(episode)) => format!("{} {}", show, episode),
        (Some(show), None) => show,
        _ => field("name").or_else(|| field("show")).or_else(|| field("id")).unwrap_or_default(),
    }
}

pub async fn run_watch(table: Option<String>, event: &str, filter: Option<String>, output: &Output) -> Result<()> {
    let ctx = AppContext::load().await?;
    let event: ChangeEvent = event.parse().map_err(|e: String| color_eyre::eyre::eyre!(e))?;
    let table = table.unwrap_or_else(|| ctx.tables().episodes.clone());

    let mut request = SubscriptionRequest::new(&table)
        .schema(&ctx.config.backend.schema)
        .event(event);
    if let Some(filter) = filter {
        request = request.filter(filter);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let realtime = ctx.realtime();
    let handle = listen(&realtime, request, move |change| {
        let _ = tx.send(change);
    })
    .await
    .map_err(|e| color_eyre::eyre::eyre!("Failed to subscribe to {}: {}", table, e))?;

    tracing::info!(operation = "watch", topic = handle.topic(), event = %event, "Listening for changes");
    output.println(format!(
        "{}",
        format!("Listening for {} on {}. Press Ctrl+C to stop.", event, table).bright_black()
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = rx.recv() => {
                let Some(change) = change else {
                    output.warn("Change feed closed");
                    break;
                };
                if output.is_human() {
                    output.println(describe_change(&change));
                } else {
                    output.json(&serde_json::to_value(&change)?);
                }
            }
        }
    }

    handle.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(event: ChangeEvent, record: Option<Value>, old_record: Option<Value>) -> ChangePayload {
        ChangePayload {
            event,
            schema: "public".to_string(),
            table: "tvshow".to_string(),
            commit_timestamp: Some("2024-05-01T10:00:00Z".to_string()),
            record,
            old_record,
        }
    }

    #[test]
    fn test_describe_change() {
        let update = change(
            ChangeEvent::Update,
            Some(json!({"Show": "Dark", "Episode": "S01E02", "Watched": true})),
            None,
        );
        assert_eq!(describe_change(&update), "2024-05-01T10:00:00Z UPDATE tvshow Dark S01E02");

        let delete = change(ChangeEvent::Delete, None, Some(json!({"id": 42})));
        assert_eq!(describe_change(&delete), "2024-05-01T10:00:00Z DELETE tvshow 42");

        let bare = change(ChangeEvent::Insert, None, None);
        assert_eq!(describe_change(&bare), "2024-05-01T10:00:00Z INSERT tvshow");
    }
}
