//! User-curated show lists: the `lists` parent rows and their `list_items`
//! membership rows.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map};
use showtrack_backend::{BackendError, DataApi, EqFilter, Filter, OrderBy, QuerySpec};
use showtrack_config::{ErrorPolicy, TableNames};
use showtrack_models::{ListItem, WatchList};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use crate::mutation::Mutation;
use crate::query::{requires_sign_in, TableQuery};

#[derive(Debug, Error)]
pub enum ListError {
    #[error("List name cannot be blank")]
    BlankName,

    #[error("No list named or identified by '{0}'")]
    NotFound(String),

    #[error("{show} is already in {list}")]
    AlreadyListed { list: String, show: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Deserialize)]
struct ShowName {
    #[serde(rename = "Show")]
    show: String,
}

/// Shows from `all_shows` that are not yet members of the list
pub fn available_shows(all_shows: &[String], items: &[ListItem]) -> Vec<String> {
    all_shows
        .iter()
        .filter(|show| !items.iter().any(|item| &item.show == *show))
        .cloned()
        .collect()
}

pub struct ListService {
    api: Arc<dyn DataApi>,
    tables: TableNames,
    policy: ErrorPolicy,
}

impl ListService {
    pub fn new(api: Arc<dyn DataApi>, tables: TableNames) -> Self {
        Self {
            api,
            tables,
            policy: ErrorPolicy::default(),
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether `error` should send the user back to sign-in under the configured policy
    pub fn needs_sign_in(&self, error: &ListError) -> bool {
        match error {
            ListError::Backend(e) => requires_sign_in(self.policy, e),
            _ => false,
        }
    }

    fn mutation(&self, table: &str) -> Mutation {
        Mutation::new(self.api.clone(), table).with_error_policy(self.policy)
    }

    fn failed(mutation: &Mutation) -> ListError {
        ListError::Backend(
            mutation
                .error()
                .cloned()
                .unwrap_or_else(|| BackendError::new("Request failed")),
        )
    }

    /// Query over every list, newest first
    pub fn lists_query(&self) -> TableQuery<WatchList> {
        let spec = QuerySpec::new(&self.tables.lists)
            .order_by(OrderBy::desc("created_at"))
            .all_rows();
        TableQuery::new(self.api.clone(), spec).with_error_policy(self.policy)
    }

    /// Query over the membership rows of one list
    pub fn items_query(&self, list_id: &str) -> TableQuery<ListItem> {
        let spec = QuerySpec::new(&self.tables.list_items)
            .filter(Filter::eq("list_id", list_id))
            .order_by(OrderBy::asc("show"))
            .all_rows();
        TableQuery::new(self.api.clone(), spec).with_error_policy(self.policy)
    }

    pub async fn lists(&self) -> Result<Vec<WatchList>, ListError> {
        let mut query = self.lists_query();
        query.fetch().await;
        Self::take(query)
    }

    pub async fn items(&self, list_id: &str) -> Result<Vec<ListItem>, ListError> {
        let mut query = self.items_query(list_id);
        query.fetch().await;
        Self::take(query)
    }

    fn take<T: Clone + DeserializeOwned>(query: TableQuery<T>) -> Result<Vec<T>, ListError> {
        if let Some(error) = query.error() {
            return Err(ListError::Backend(error.clone()));
        }
        Ok(query.data().map(|rows| rows.to_vec()).unwrap_or_default())
    }

    /// Find a list by id, or by case-insensitive name
    pub async fn resolve(&self, id_or_name: &str) -> Result<WatchList, ListError> {
        let needle = id_or_name.trim();
        self.lists()
            .await?
            .into_iter()
            .find(|list| list.id == needle || list.name.eq_ignore_ascii_case(needle))
            .ok_or_else(|| ListError::NotFound(needle.to_string()))
    }

    pub async fn create(&self, name: &str) -> Result<(), ListError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ListError::BlankName);
        }

        let mut values = Map::new();
        values.insert("name".to_string(), json!(name));
        let mut mutation = self.mutation(&self.tables.lists);
        if !mutation.insert_record(&values).await {
            return Err(Self::failed(&mutation));
        }
        info!(operation = "create_list", name = name, "Created list");
        Ok(())
    }

    pub async fn delete(&self, list_id: &str) -> Result<(), ListError> {
        let mut mutation = self.mutation(&self.tables.lists);
        if !mutation.delete_record(&[EqFilter::new("id", list_id)]).await {
            return Err(Self::failed(&mutation));
        }
        info!(operation = "delete_list", list_id = list_id, "Deleted list");
        Ok(())
    }

    pub async fn add_show(&self, list_id: &str, show: &str) -> Result<(), ListError> {
        let items = self.items(list_id).await?;
        if items.iter().any(|item| item.show == show) {
            return Err(ListError::AlreadyListed {
                list: list_id.to_string(),
                show: show.to_string(),
            });
        }

        let mut values = Map::new();
        values.insert("list_id".to_string(), json!(list_id));
        values.insert("show".to_string(), json!(show));
        let mut mutation = self.mutation(&self.tables.list_items);
        if !mutation.insert_record(&values).await {
            return Err(Self::failed(&mutation));
        }
        info!(operation = "add_to_list", list_id = list_id, show = show, "Added show to list");
        Ok(())
    }

    pub async fn remove_show(&self, list_id: &str, show: &str) -> Result<(), ListError> {
        let mut mutation = self.mutation(&self.tables.list_items);
        let filters = [EqFilter::new("list_id", list_id), EqFilter::new("show", show)];
        if !mutation.delete_record(&filters).await {
            return Err(Self::failed(&mutation));
        }
        info!(operation = "remove_from_list", list_id = list_id, show = show, "Removed show from list");
        Ok(())
    }

    /// Shows from the episodes collection that the list does not contain yet
    pub async fn available(&self, list_id: &str) -> Result<Vec<String>, ListError> {
        let mut names: TableQuery<ShowName> = TableQuery::new(
            self.api.clone(),
            QuerySpec::new(&self.tables.episodes).columns("Show").all_rows(),
        )
        .with_error_policy(self.policy);
        names.fetch().await;
        if let Some(error) = names.error() {
            return Err(ListError::Backend(error.clone()));
        }

        let all: Vec<String> = names
            .data()
            .unwrap_or_default()
            .iter()
            .map(|row| row.show.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let items = self.items(list_id).await?;
        Ok(available_shows(&all, &items))
    }
}
