pub mod episode;
pub mod list;
pub mod status;
pub mod user;

pub use episode::{Episode, EpisodeEdit, EpisodeKey};
pub use list::{ListItem, WatchList};
pub use status::{ParseStatusError, ShowStatus};
pub use user::{Session, User};
