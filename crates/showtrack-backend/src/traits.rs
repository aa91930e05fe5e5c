use async_trait::async_trait;
use serde_json::{Map, Value};
use showtrack_models::{Session, User};
use crate::auth::SignUpOutcome;
use crate::error::Result;
use crate::query::{EqFilter, Filter, QuerySpec};
use crate::realtime::{ChangePayload, SubscriptionRequest};

/// Row storage of the hosted backend
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Exact number of rows in `table` matching `filters`
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64>;

    /// Rows matching the spec, as raw JSON objects
    async fn select(&self, spec: &QuerySpec) -> Result<Vec<Value>>;

    /// Apply `values` to every row matching all `filters`
    async fn update(&self, table: &str, values: &Map<String, Value>, filters: &[EqFilter]) -> Result<()>;

    async fn insert(&self, table: &str, values: &Map<String, Value>) -> Result<()>;

    /// Delete every row matching all `filters`
    async fn delete(&self, table: &str, filters: &[EqFilter]) -> Result<()>;
}

/// Password authentication endpoints
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome>;
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;
    async fn get_user(&self, access_token: &str) -> Result<User>;
}

/// An open change-notification subscription
#[async_trait]
pub trait ChangeFeed: Send {
    /// Next change; `None` once the subscription has ended
    async fn next_change(&mut self) -> Option<Result<ChangePayload>>;

    /// Leave the channel and close the transport
    async fn close(&mut self) -> Result<()>;
}

/// Opens change-notification subscriptions
#[async_trait]
pub trait RealtimeApi: Send + Sync {
    async fn subscribe(&self, request: SubscriptionRequest) -> Result<Box<dyn ChangeFeed>>;
}
