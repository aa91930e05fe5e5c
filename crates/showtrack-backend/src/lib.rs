//! Typed client for the hosted backend: row queries and mutations over the
//! REST API, password authentication, and realtime change subscriptions.

pub mod auth;
pub mod error;
pub mod query;
pub mod realtime;
pub mod rest;
pub mod traits;

pub use auth::{AuthClient, SignUpOutcome};
pub use error::{BackendError, Result};
pub use query::{page_range, parse_content_range, total_pages, EqFilter, Filter, FilterOperator, OrderBy, QuerySpec, Window};
pub use realtime::{ChangeEvent, ChangePayload, RealtimeClient, RealtimeSubscription, SubscriptionRequest};
pub use rest::RestClient;
pub use traits::{AuthApi, ChangeFeed, DataApi, RealtimeApi};
