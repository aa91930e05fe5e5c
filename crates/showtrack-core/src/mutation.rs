use serde_json::{Map, Value};
use showtrack_backend::{BackendError, DataApi, EqFilter};
use showtrack_config::ErrorPolicy;
use std::sync::Arc;
use tracing::{error, info};
use crate::query::requires_sign_in;

/// Writes against one collection.
///
/// Every operation reports success as a `bool` and keeps the last error; no
/// backend failure escapes this type.
pub struct Mutation {
    api: Arc<dyn DataApi>,
    table: String,
    policy: ErrorPolicy,
    loading: bool,
    error: Option<BackendError>,
    needs_sign_in: bool,
}

impl Mutation {
    pub fn new(api: Arc<dyn DataApi>, table: impl Into<String>) -> Self {
        Self {
            api,
            table: table.into(),
            policy: ErrorPolicy::default(),
            loading: false,
            error: None,
            needs_sign_in: false,
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Apply `updates` to the rows matching every filter
    pub async fn update_record(&mut self, updates: &Map<String, Value>, filters: &[EqFilter]) -> bool {
        if filters.is_empty() {
            return self.reject("Refusing to update without a filter");
        }
        if updates.is_empty() {
            return self.reject("Nothing to update");
        }

        self.begin();
        let result = self.api.update(&self.table, updates, filters).await;
        self.finish("update", result)
    }

    pub async fn insert_record(&mut self, values: &Map<String, Value>) -> bool {
        self.begin();
        let result = self.api.insert(&self.table, values).await;
        self.finish("insert", result)
    }

    /// Delete the rows matching every filter
    pub async fn delete_record(&mut self, filters: &[EqFilter]) -> bool {
        if filters.is_empty() {
            return self.reject("Refusing to delete without a filter");
        }

        self.begin();
        let result = self.api.delete(&self.table, filters).await;
        self.finish("delete", result)
    }

    fn begin(&mut self) {
        self.loading = true;
        self.error = None;
        self.needs_sign_in = false;
    }

    fn finish(&mut self, operation: &str, result: showtrack_backend::Result<()>) -> bool {
        self.loading = false;
        match result {
            Ok(()) => {
                info!(operation = operation, table = %self.table, "Mutation applied");
                true
            }
            Err(e) => {
                error!(operation = operation, table = %self.table, error = %e, "Mutation failed");
                self.needs_sign_in = requires_sign_in(self.policy, &e);
                self.error = Some(e);
                false
            }
        }
    }

    fn reject(&mut self, message: &str) -> bool {
        error!(table = %self.table, "{}", message);
        self.loading = false;
        self.needs_sign_in = false;
        self.error = Some(BackendError::new(message));
        false
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&BackendError> {
        self.error.as_ref()
    }

    pub fn needs_sign_in(&self) -> bool {
        self.needs_sign_in
    }
}
