pub mod auth;
pub mod lists;
pub mod mutation;
pub mod query;
pub mod realtime;
pub mod show_details;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthError, AuthSession};
pub use lists::{available_shows, ListError, ListService};
pub use mutation::Mutation;
pub use query::TableQuery;
pub use realtime::{listen, RealtimeHandle, RefreshListener, RefreshSignal};
pub use show_details::{decode_show_name, encode_show_name, ShowDetails, ShowError};
pub use stats::{categorize, group_by_show, percentage, Categories, DashboardSummary, ProgressCategory, ShowProgress};
