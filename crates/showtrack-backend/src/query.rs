//! Query description for the REST row API and its rendering into request
//! parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eq" | "=" => Ok(FilterOperator::Eq),
            "neq" | "!=" => Ok(FilterOperator::Neq),
            "gt" | ">" => Ok(FilterOperator::Gt),
            "gte" | ">=" => Ok(FilterOperator::Gte),
            "lt" | "<" => Ok(FilterOperator::Lt),
            "lte" | "<=" => Ok(FilterOperator::Lte),
            "like" => Ok(FilterOperator::Like),
            "ilike" => Ok(FilterOperator::Ilike),
            "is" => Ok(FilterOperator::Is),
            "in" => Ok(FilterOperator::In),
            other => Err(format!("Unsupported filter operator: {}", other)),
        }
    }
}

/// `{column, operator, value}` row filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Eq, value)
    }

    /// Right-hand side of a `column=op.value` parameter
    pub fn param_value(&self) -> String {
        match (&self.operator, &self.value) {
            (FilterOperator::In, Value::Array(items)) => {
                let rendered: Vec<String> = items.iter().map(render_list_item).collect();
                format!("in.({})", rendered.join(","))
            }
            (FilterOperator::Eq, Value::Null) | (FilterOperator::Is, Value::Null) => "is.null".to_string(),
            (FilterOperator::Neq, Value::Null) => "not.is.null".to_string(),
            (op, value) => format!("{}.{}", op, render_scalar(value)),
        }
    }
}

/// Exact-match filter used by mutations (AND-combined)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqFilter {
    pub column: String,
    pub value: Value,
}

impl EqFilter {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl From<EqFilter> for Filter {
    fn from(f: EqFilter) -> Self {
        Filter::new(f.column, FilterOperator::Eq, f.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    pub fn param_value(&self) -> String {
        format!("{}.{}", self.column, if self.ascending { "asc" } else { "desc" })
    }
}

/// Which slice of the matching rows to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    /// 1-based page of `page_size` rows
    Page { page: u32, page_size: u32 },
    /// First `n` rows
    Limit(u32),
    /// Every matching row
    All,
}

impl Default for Window {
    fn default() -> Self {
        Window::Page { page: 1, page_size: 10 }
    }
}

/// Everything a row fetch depends on. Two specs that compare equal produce the
/// same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub window: Window,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            window: Window::default(),
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.window = Window::Page { page, page_size };
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.window = Window::Limit(limit);
        self
    }

    pub fn all_rows(mut self) -> Self {
        self.window = Window::All;
        self
    }

    /// Query-string parameters for the row fetch (the page window travels as a
    /// `Range` header, see [`QuerySpec::row_range`])
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        pairs.extend(filter_pairs(&self.filters));
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.param_value()));
        }
        if let Window::Limit(limit) = self.window {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// Inclusive row range for a paged window
    pub fn row_range(&self) -> Option<(u64, u64)> {
        match self.window {
            Window::Page { page, page_size } => Some(page_range(page, page_size)),
            _ => None,
        }
    }

    pub fn page_size(&self) -> Option<u32> {
        match self.window {
            Window::Page { page_size, .. } => Some(page_size),
            _ => None,
        }
    }
}

pub fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), f.param_value()))
        .collect()
}

/// Inclusive `[(page-1)·size, page·size − 1]` range; page 0 is treated as page 1
pub fn page_range(page: u32, page_size: u32) -> (u64, u64) {
    let page = page.max(1) as u64;
    let size = page_size.max(1) as u64;
    ((page - 1) * size, page * size - 1)
}

/// `ceil(total / page_size)`; zero when there is nothing to page
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64)
}

/// Total from a `Content-Range` header (`0-9/57`, `*/57`); `None` when the
/// server reports an unknown total (`0-9/*`)
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// Items in an `in.(...)` list need quoting when they contain reserved characters.
fn render_list_item(value: &Value) -> String {
    let raw = render_scalar(value);
    if raw.contains(&[',', '(', ')', '"', ' '][..]) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        raw
    }
}
