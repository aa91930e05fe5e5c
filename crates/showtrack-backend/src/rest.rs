use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use crate::error::{error_from_response, BackendError, Result};
use crate::query::{filter_pairs, parse_content_range, EqFilter, Filter, QuerySpec};
use crate::traits::DataApi;

/// Create a reqwest Client shared by the REST and auth clients
pub fn create_http_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(concat!("showtrack/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Row API client (`{url}/rest/v1/{table}`)
#[derive(Clone)]
pub struct RestClient {
    client: Arc<Client>,
    base_url: String,
    anon_key: String,
    schema: String,
    access_token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client: Arc::new(create_http_client(Duration::from_secs(30))),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            schema: "public".to_string(),
            access_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Arc::new(create_http_client(timeout));
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Send requests as the signed-in user instead of the anon role
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, urlencoding::encode(table))
    }

    fn authorize(&self, builder: RequestBuilder, writes: bool) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        let builder = builder
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Accept", "application/json");
        if self.schema == "public" {
            builder
        } else if writes {
            builder.header("Content-Profile", &self.schema)
        } else {
            builder.header("Accept-Profile", &self.schema)
        }
    }
}

#[async_trait]
impl DataApi for RestClient {
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(filter_pairs(filters));

        let response = self
            .authorize(self.client.head(self.table_url(table)), false)
            .query(&pairs)
            .header("Prefer", "count=exact")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("Failed to count {}", table)).await);
        }

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| BackendError::new(format!("Failed to count {}: missing Content-Range total", table)))?;

        debug!(table = table, total = total, "Counted rows");
        Ok(total)
    }

    async fn select(&self, spec: &QuerySpec) -> Result<Vec<Value>> {
        let mut request = self
            .authorize(self.client.get(self.table_url(&spec.table)), false)
            .query(&spec.query_pairs());

        if let Some((from, to)) = spec.row_range() {
            request = request
                .header("Range-Unit", "items")
                .header("Range", format!("{}-{}", from, to));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("Failed to fetch {}", spec.table)).await);
        }

        let rows: Vec<Value> = response.json().await?;
        debug!(table = %spec.table, rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn update(&self, table: &str, values: &Map<String, Value>, filters: &[EqFilter]) -> Result<()> {
        let pairs = filter_pairs(&filters.iter().cloned().map(Filter::from).collect::<Vec<_>>());

        let response = self
            .authorize(self.client.patch(self.table_url(table)), true)
            .query(&pairs)
            .header("Prefer", "return=minimal")
            .json(values)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("Failed to update {}", table)).await);
        }
        Ok(())
    }

    async fn insert(&self, table: &str, values: &Map<String, Value>) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.table_url(table)), true)
            .header("Prefer", "return=minimal")
            .json(values)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("Failed to insert into {}", table)).await);
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[EqFilter]) -> Result<()> {
        let pairs = filter_pairs(&filters.iter().cloned().map(Filter::from).collect::<Vec<_>>());

        let response = self
            .authorize(self.client.delete(self.table_url(table)), true)
            .query(&pairs)
            .header("Prefer", "return=minimal")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("Failed to delete from {}", table)).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_and_encodes() {
        let client = RestClient::new("https://abcd.supabase.co/", "anon");
        assert_eq!(client.table_url("tvshow"), "https://abcd.supabase.co/rest/v1/tvshow");
        assert_eq!(client.table_url("list items"), "https://abcd.supabase.co/rest/v1/list%20items");
    }

    #[test]
    fn test_authorize_prefers_access_token() {
        let anon = RestClient::new("https://abcd.supabase.co", "anon");
        let request = anon
            .authorize(anon.client.get("https://abcd.supabase.co/rest/v1/tvshow"), false)
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer anon");
        assert_eq!(request.headers()["apikey"], "anon");
        assert!(request.headers().get("accept-profile").is_none());

        let user = RestClient::new("https://abcd.supabase.co", "anon")
            .with_schema("tracker")
            .with_access_token(Some("jwt".to_string()));
        let request = user
            .authorize(user.client.patch("https://abcd.supabase.co/rest/v1/tvshow"), true)
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer jwt");
        assert_eq!(request.headers()["content-profile"], "tracker");
        assert!(user.is_authenticated());
    }
}
