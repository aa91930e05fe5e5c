use serde_json::{json, Map};
use showtrack_backend::{BackendError, DataApi, EqFilter, Filter, OrderBy, QuerySpec, SubscriptionRequest};
use showtrack_config::ErrorPolicy;
use showtrack_models::{Episode, EpisodeEdit, EpisodeKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use crate::mutation::Mutation;
use crate::query::TableQuery;
use crate::stats::ShowProgress;

#[derive(Debug, Error)]
pub enum ShowError {
    #[error("Episode {episode} of {show} not found")]
    EpisodeNotFound { show: String, episode: String },

    #[error("No changes to save")]
    EmptyEdit,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Turn a CamelCase route segment back into a show name
/// (`BreakingBad` → `Breaking Bad`). Names that already contain spaces are
/// returned trimmed.
pub fn decode_show_name(segment: &str) -> String {
    let mut decoded = String::with_capacity(segment.len() + 4);
    let mut previous: Option<char> = None;
    for c in segment.chars() {
        if c.is_ascii_uppercase() && previous.map(|p| !p.is_whitespace()).unwrap_or(false) {
            decoded.push(' ');
        }
        decoded.push(c);
        previous = Some(c);
    }
    decoded.trim().to_string()
}

/// Inverse of [`decode_show_name`]
pub fn encode_show_name(name: &str) -> String {
    name.split_whitespace().collect()
}

/// Every episode of one show with watched toggling and inline edits.
pub struct ShowDetails {
    show: String,
    query: TableQuery<Episode>,
    mutation: Mutation,
}

impl ShowDetails {
    pub fn new(api: Arc<dyn DataApi>, table: &str, show: impl Into<String>) -> Self {
        let show = show.into();
        let spec = QuerySpec::new(table)
            .filter(Filter::eq("Show", show.as_str()))
            .order_by(OrderBy::asc("Episode"))
            .all_rows();
        Self {
            query: TableQuery::new(api.clone(), spec),
            mutation: Mutation::new(api, table),
            show,
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.query = self.query.with_error_policy(policy);
        self.mutation = self.mutation.with_error_policy(policy);
        self
    }

    pub fn show(&self) -> &str {
        &self.show
    }

    pub async fn fetch(&mut self) -> &TableQuery<Episode> {
        self.query.fetch().await
    }

    pub fn query(&self) -> &TableQuery<Episode> {
        &self.query
    }

    pub fn episodes(&self) -> &[Episode] {
        self.query.data().unwrap_or_default()
    }

    pub fn find(&self, episode: &str) -> Option<&Episode> {
        self.episodes().iter().find(|e| e.episode == episode)
    }

    pub fn progress(&self) -> ShowProgress {
        let episodes = self.episodes();
        ShowProgress {
            show: self.show.clone(),
            total: episodes.len() as u64,
            watched: episodes.iter().filter(|e| e.watched).count() as u64,
        }
    }

    /// Realtime scope for this show's rows
    pub fn subscription(&self) -> SubscriptionRequest {
        SubscriptionRequest::new(self.mutation.table()).filter(format!("Show=eq.{}", self.show))
    }

    fn key_filters(key: &EpisodeKey) -> [EqFilter; 2] {
        [
            EqFilter::new("Show", key.show.as_str()),
            EqFilter::new("Episode", key.episode.as_str()),
        ]
    }

    fn mutation_error(&self) -> ShowError {
        ShowError::Backend(
            self.mutation
                .error()
                .cloned()
                .unwrap_or_else(|| BackendError::new("Update failed")),
        )
    }

    /// Flip the watched flag of `episode` and refetch. Returns the new flag.
    pub async fn toggle_watched(&mut self, episode: &str) -> Result<bool, ShowError> {
        let current = self.find(episode).ok_or_else(|| ShowError::EpisodeNotFound {
            show: self.show.clone(),
            episode: episode.to_string(),
        })?;
        let key = current.key();
        let watched = !current.watched;

        let mut updates = Map::new();
        updates.insert("Watched".to_string(), json!(watched));
        if !self.mutation.update_record(&updates, &Self::key_filters(&key)).await {
            return Err(self.mutation_error());
        }

        info!(show = %key.show, episode = %key.episode, watched = watched, "Toggled watched status");
        self.query.refetch().await;
        Ok(watched)
    }

    /// Apply `edit` to the episode identified by its original key and refetch
    pub async fn save_edit(&mut self, original: &EpisodeKey, edit: &EpisodeEdit) -> Result<(), ShowError> {
        if edit.is_empty() {
            return Err(ShowError::EmptyEdit);
        }
        if !self.mutation.update_record(&edit.to_update_map(), &Self::key_filters(original)).await {
            return Err(self.mutation_error());
        }

        info!(show = %original.show, episode = %original.episode, "Saved episode edit");
        self.query.refetch().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDataApi;

    fn api() -> Arc<MemoryDataApi> {
        Arc::new(MemoryDataApi::new().with_rows(
            "tvshow",
            vec![
                json!({"id": 1, "Show": "Breaking Bad", "Episode": "S01E02", "Title": "Cat's in the Bag", "Air Date": "2008-01-27", "Watched": false}),
                json!({"id": 2, "Show": "Breaking Bad", "Episode": "S01E01", "Title": "Pilot", "Air Date": "2008-01-20", "Watched": true}),
                json!({"id": 3, "Show": "Dark", "Episode": "S01E01", "Title": "Secrets", "Air Date": "2017-12-01", "Watched": false}),
            ],
        ))
    }

    #[test]
    fn test_decode_show_name() {
        assert_eq!(decode_show_name("BreakingBad"), "Breaking Bad");
        assert_eq!(decode_show_name("Dark"), "Dark");
        assert_eq!(decode_show_name("Breaking Bad"), "Breaking Bad");
        assert_eq!(decode_show_name("TheOC"), "The O C");
        assert_eq!(encode_show_name("Breaking Bad"), "BreakingBad");
    }

    #[tokio::test]
    async fn test_fetch_scopes_to_show() {
        let mut details = ShowDetails::new(api(), "tvshow", "Breaking Bad");
        details.fetch().await;

        let codes: Vec<_> = details.episodes().iter().map(|e| e.episode.as_str()).collect();
        assert_eq!(codes, vec!["S01E01", "S01E02"]);
        let progress = details.progress();
        assert_eq!((progress.watched, progress.total), (1, 2));
        assert_eq!(progress.percentage(), 50);
    }

    #[tokio::test]
    async fn test_toggle_watched_updates_only_that_episode() {
        let api = api();
        let mut details = ShowDetails::new(api.clone(), "tvshow", "Breaking Bad");
        details.fetch().await;

        assert!(details.toggle_watched("S01E02").await.unwrap());
        assert!(details.find("S01E02").unwrap().watched);

        let rows = api.rows("tvshow");
        assert_eq!(rows[2]["Watched"], false);

        assert!(!details.toggle_watched("S01E02").await.unwrap());
        assert!(matches!(
            details.toggle_watched("S09E09").await,
            Err(ShowError::EpisodeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_edit_and_failure() {
        let api = api();
        let mut details = ShowDetails::new(api.clone(), "tvshow", "Breaking Bad");
        details.fetch().await;

        let original = EpisodeKey::new("Breaking Bad", "S01E01");
        let edit = EpisodeEdit {
            title: Some("Pilot (Extended)".to_string()),
            ..Default::default()
        };
        details.save_edit(&original, &edit).await.unwrap();
        assert_eq!(details.find("S01E01").unwrap().title, "Pilot (Extended)");

        assert!(matches!(
            details.save_edit(&original, &EpisodeEdit::default()).await,
            Err(ShowError::EmptyEdit)
        ));

        api.fail_with(Some(BackendError::new("row-level security violation")));
        let err = details.save_edit(&original, &edit).await.unwrap_err();
        assert_eq!(err.to_string(), "row-level security violation");
    }

    #[test]
    fn test_subscription_filter() {
        let details = ShowDetails::new(api(), "tvshow", "Dark");
        let request = details.subscription();
        assert_eq!(request.filter.as_deref(), Some("Show=eq.Dark"));
        assert_eq!(request.topic(), "realtime:public:tvshow");
    }
}
