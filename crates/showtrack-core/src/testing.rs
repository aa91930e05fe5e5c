//! In-memory stand-ins for the backend traits.

use async_trait::async_trait;
use serde_json::{Map, Value};
use showtrack_backend::{
    BackendError, ChangeFeed, ChangePayload, DataApi, EqFilter, Filter, FilterOperator, QuerySpec, Result, Window,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Rows kept per table in insertion order
#[derive(Default)]
pub struct MemoryDataApi {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failure: Mutex<Option<BackendError>>,
    selects: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryDataApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(table.to_string(), rows);
        self
    }

    /// Every subsequent call fails with `error` until cleared
    pub fn fail_with(&self, error: Option<BackendError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn select_calls(&self) -> usize {
        self.selects.load(AtomicOrdering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn matching(&self, table: &str, filters: &[Filter]) -> Vec<Value> {
        self.rows(table)
            .into_iter()
            .filter(|row| filters.iter().all(|f| row_matches(row, f)))
            .collect()
    }
}

fn as_filters(filters: &[EqFilter]) -> Vec<Filter> {
    filters.iter().cloned().map(Filter::from).collect()
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), other) | (other, Value::String(a)) if !other.is_string() => {
            *a == other.to_string()
        }
        _ => left == right,
    }
}

fn row_matches(row: &Value, filter: &Filter) -> bool {
    let cell = row.get(&filter.column).unwrap_or(&Value::Null);
    let ordering = compare(cell, &filter.value);
    match filter.operator {
        FilterOperator::Eq | FilterOperator::Is => loose_eq(cell, &filter.value),
        FilterOperator::Neq => !loose_eq(cell, &filter.value),
        FilterOperator::Gt => ordering == Some(Ordering::Greater),
        FilterOperator::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        FilterOperator::Lt => ordering == Some(Ordering::Less),
        FilterOperator::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        FilterOperator::Like | FilterOperator::Ilike => {
            let pattern = filter.value.as_str().unwrap_or_default().replace('%', "");
            let text = cell.as_str().unwrap_or_default();
            if filter.operator == FilterOperator::Ilike {
                text.to_lowercase().contains(&pattern.to_lowercase())
            } else {
                text.contains(&pattern)
            }
        }
        FilterOperator::In => filter
            .value
            .as_array()
            .map(|items| items.iter().any(|item| loose_eq(cell, item)))
            .unwrap_or(false),
    }
}

#[async_trait]
impl DataApi for MemoryDataApi {
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        self.check_failure()?;
        Ok(self.matching(table, filters).len() as u64)
    }

    async fn select(&self, spec: &QuerySpec) -> Result<Vec<Value>> {
        self.selects.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_failure()?;
        let mut rows = self.matching(&spec.table, &spec.filters);

        if let Some(order) = &spec.order {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let ordering = compare(left, right).unwrap_or(Ordering::Equal);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        Ok(match spec.window {
            Window::Page { .. } => {
                let (from, to) = spec.row_range().unwrap_or((0, 0));
                rows.into_iter()
                    .skip(from as usize)
                    .take((to - from + 1) as usize)
                    .collect()
            }
            Window::Limit(limit) => rows.into_iter().take(limit as usize).collect(),
            Window::All => rows,
        })
    }

    async fn update(&self, table: &str, values: &Map<String, Value>, filters: &[EqFilter]) -> Result<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_failure()?;
        let filters = as_filters(filters);
        let mut tables = self.tables.lock().unwrap();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if filters.iter().all(|f| row_matches(row, f)) {
                if let Value::Object(fields) = row {
                    for (column, value) in values {
                        fields.insert(column.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn insert(&self, table: &str, values: &Map<String, Value>) -> Result<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_failure()?;
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(Value::Object(values.clone()));
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[EqFilter]) -> Result<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_failure()?;
        let filters = as_filters(filters);
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !filters.iter().all(|f| row_matches(row, f)));
        }
        Ok(())
    }
}

/// Change feed driven by the test through an unbounded channel
pub struct ScriptedFeed {
    receiver: mpsc::UnboundedReceiver<Result<ChangePayload>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedFeed {
    /// Returns the feed, its sender, and a counter of `close` calls
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<ChangePayload>>, Arc<AtomicUsize>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicUsize::new(0));
        (
            Self {
                receiver,
                closed: closed.clone(),
            },
            sender,
            closed,
        )
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn next_change(&mut self) -> Option<Result<ChangePayload>> {
        self.receiver.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, AtomicOrdering::SeqCst);
        self.receiver.close();
        Ok(())
    }
}
