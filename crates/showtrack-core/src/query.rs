//! Stateful row query: owns its inputs and the last fetched state.

use serde::de::DeserializeOwned;
use showtrack_backend::{total_pages, BackendError, DataApi, QuerySpec, Result, Window};
use showtrack_config::ErrorPolicy;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether `error` should send the session back to sign-in under `policy`
pub(crate) fn requires_sign_in(policy: ErrorPolicy, error: &BackendError) -> bool {
    match policy {
        ErrorPolicy::Surface => false,
        ErrorPolicy::RedirectToSignIn => true,
        ErrorPolicy::RedirectOnAuthFailure => error.is_auth_failure(),
    }
}

/// Paginated, filtered, sorted fetch of one collection.
///
/// `data` stays `None` until the first fetch resolves. A failed fetch keeps
/// the previous rows and records the error.
pub struct TableQuery<T> {
    api: Arc<dyn DataApi>,
    spec: QuerySpec,
    policy: ErrorPolicy,
    data: Option<Vec<T>>,
    total_count: u64,
    loading: bool,
    error: Option<BackendError>,
    needs_sign_in: bool,
}

impl<T: DeserializeOwned> TableQuery<T> {
    pub fn new(api: Arc<dyn DataApi>, spec: QuerySpec) -> Self {
        Self {
            api,
            spec,
            policy: ErrorPolicy::default(),
            data: None,
            total_count: 0,
            loading: false,
            error: None,
            needs_sign_in: false,
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Count the filtered collection, then fetch the current window
    pub async fn fetch(&mut self) -> &Self {
        self.loading = true;
        self.error = None;
        self.needs_sign_in = false;

        let result = self.load().await;
        self.loading = false;

        match result {
            Ok((rows, total)) => {
                debug!(
                    operation = "fetch",
                    table = %self.spec.table,
                    rows = rows.len(),
                    total = total,
                    "Fetched rows"
                );
                self.data = Some(rows);
                self.total_count = total;
            }
            Err(e) => {
                warn!(operation = "fetch", table = %self.spec.table, error = %e, "Fetch failed");
                self.needs_sign_in = requires_sign_in(self.policy, &e);
                self.error = Some(e);
            }
        }
        self
    }

    async fn load(&self) -> Result<(Vec<T>, u64)> {
        let total = self.api.count(&self.spec.table, &self.spec.filters).await?;
        let rows = self.api.select(&self.spec).await?;
        let rows = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok((rows, total))
    }

    /// Fetch again with the current inputs
    pub async fn refetch(&mut self) -> &Self {
        self.fetch().await
    }

    /// Replace the inputs. Fetches only when the new spec differs from the
    /// current one; returns whether a fetch happened.
    pub async fn set_spec(&mut self, spec: QuerySpec) -> bool {
        if spec == self.spec {
            return false;
        }
        self.spec = spec;
        self.fetch().await;
        true
    }

    /// Move a paged query to `page`; no-op for limit and unbounded windows
    pub async fn set_page(&mut self, page: u32) -> bool {
        match self.spec.window {
            Window::Page { page_size, .. } => {
                let spec = self.spec.clone().page(page.max(1), page_size);
                self.set_spec(spec).await
            }
            _ => false,
        }
    }

    pub fn data(&self) -> Option<&[T]> {
        self.data.as_deref()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&BackendError> {
        self.error.as_ref()
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// `ceil(total / page_size)` for paged queries; a limit or unbounded
    /// window is a single page when anything matched
    pub fn total_pages(&self) -> u64 {
        match self.spec.window {
            Window::Page { page_size, .. } => total_pages(self.total_count, page_size),
            Window::Limit(_) | Window::All => u64::from(self.total_count > 0),
        }
    }

    pub fn current_page(&self) -> u32 {
        match self.spec.window {
            Window::Page { page, .. } => page.max(1),
            _ => 1,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn needs_sign_in(&self) -> bool {
        self.needs_sign_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDataApi;
    use serde_json::json;
    use showtrack_backend::{Filter, OrderBy};
    use showtrack_models::Episode;

    fn episodes(count: usize) -> Vec<serde_json::Value> {
        (1..=count)
            .map(|i| {
                json!({
                    "id": i,
                    "Show": if i % 2 == 0 { "Dark" } else { "Severance" },
                    "Episode": format!("S01E{:02}", i),
                    "Title": format!("Episode {}", i),
                    "Air Date": "2020-01-01",
                    "Watched": i <= 3,
                })
            })
            .collect()
    }

    fn api(count: usize) -> Arc<MemoryDataApi> {
        Arc::new(MemoryDataApi::new().with_rows("tvshow", episodes(count)))
    }

    #[tokio::test]
    async fn test_fetch_pages_and_counts() {
        let api = api(23);
        let mut query: TableQuery<Episode> =
            TableQuery::new(api.clone(), QuerySpec::new("tvshow").page(3, 10));
        assert!(query.data().is_none());

        query.fetch().await;

        assert!(!query.loading());
        assert!(query.error().is_none());
        assert_eq!(query.total_count(), 23);
        assert_eq!(query.total_pages(), 3);
        let rows = query.data().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].episode, "S01E21");
    }

    #[tokio::test]
    async fn test_count_uses_filters() {
        let api = api(10);
        let spec = QuerySpec::new("tvshow")
            .filter(Filter::eq("Show", "Dark"))
            .order_by(OrderBy::desc("Episode"))
            .page(1, 3);
        let mut query: TableQuery<Episode> = TableQuery::new(api, spec);
        query.fetch().await;

        assert_eq!(query.total_count(), 5);
        assert_eq!(query.total_pages(), 2);
        let codes: Vec<_> = query.data().unwrap().iter().map(|e| e.episode.as_str()).collect();
        assert_eq!(codes, vec!["S01E10", "S01E08", "S01E06"]);
    }

    #[tokio::test]
    async fn test_empty_collection_has_no_pages() {
        let api = Arc::new(MemoryDataApi::new());
        let mut query: TableQuery<Episode> = TableQuery::new(api, QuerySpec::new("tvshow"));
        query.fetch().await;
        assert_eq!(query.data().map(|d| d.len()), Some(0));
        assert_eq!(query.total_pages(), 0);
    }

    #[tokio::test]
    async fn test_limit_window_is_one_page() {
        let mut query: TableQuery<Episode> = TableQuery::new(api(7), QuerySpec::new("tvshow").limit(4));
        query.fetch().await;
        assert_eq!(query.data().unwrap().len(), 4);
        assert_eq!(query.total_count(), 7);
        assert_eq!(query.total_pages(), 1);
    }

    #[tokio::test]
    async fn test_set_spec_refetches_only_on_change() {
        let api = api(15);
        let spec = QuerySpec::new("tvshow").page(1, 10);
        let mut query: TableQuery<Episode> = TableQuery::new(api.clone(), spec.clone());
        query.fetch().await;
        assert_eq!(api.select_calls(), 1);

        assert!(!query.set_spec(spec.clone()).await);
        assert_eq!(api.select_calls(), 1);

        assert!(query.set_page(2).await);
        assert_eq!(api.select_calls(), 2);
        assert_eq!(query.current_page(), 2);
        assert_eq!(query.data().unwrap().len(), 5);

        query.refetch().await;
        assert_eq!(api.select_calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_rows_and_records_error() {
        let api = api(4);
        let mut query: TableQuery<Episode> = TableQuery::new(api.clone(), QuerySpec::new("tvshow"));
        query.fetch().await;

        api.fail_with(Some(BackendError::with_status(500, "relation does not exist")));
        query.refetch().await;

        assert_eq!(query.error().unwrap().message(), "relation does not exist");
        assert_eq!(query.data().unwrap().len(), 4);
        assert!(!query.needs_sign_in());

        api.fail_with(None);
        query.refetch().await;
        assert!(query.error().is_none());
    }

    #[tokio::test]
    async fn test_error_policies() {
        let api = api(2);
        api.fail_with(Some(BackendError::with_status(500, "boom")));

        let mut any: TableQuery<Episode> = TableQuery::new(api.clone(), QuerySpec::new("tvshow"))
            .with_error_policy(ErrorPolicy::RedirectToSignIn);
        any.fetch().await;
        assert!(any.needs_sign_in());

        let mut auth_only: TableQuery<Episode> = TableQuery::new(api.clone(), QuerySpec::new("tvshow"))
            .with_error_policy(ErrorPolicy::RedirectOnAuthFailure);
        auth_only.fetch().await;
        assert!(!auth_only.needs_sign_in());

        api.fail_with(Some(BackendError::with_status(401, "JWT expired")));
        auth_only.refetch().await;
        assert!(auth_only.needs_sign_in());
    }

    #[tokio::test]
    async fn test_undecodable_rows_surface_as_error() {
        let api = Arc::new(MemoryDataApi::new().with_rows("tvshow", vec![json!({"Title": "no show"})]));
        let mut query: TableQuery<Episode> = TableQuery::new(api, QuerySpec::new("tvshow"));
        query.fetch().await;
        assert!(query.error().is_some());
        assert!(query.data().is_none());
    }
}
