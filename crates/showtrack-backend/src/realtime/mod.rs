pub mod client;
pub mod protocol;

pub use client::{RealtimeClient, RealtimeSubscription};
pub use protocol::{ChangeEvent, ChangePayload, SubscriptionRequest};
