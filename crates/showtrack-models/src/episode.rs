use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use crate::status::ShowStatus;

/// One row of the episodes collection.
///
/// Column names follow the hosted table (`Show`, `Episode`, `Air Date`, ...),
/// so the struct round-trips through the REST API without a mapping layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    /// Surrogate identifier; older rows may not carry one
    #[serde(default, deserialize_with = "deserialize_optional_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Show")]
    pub show: String,
    #[serde(rename = "Episode")]
    pub episode: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    /// Calendar date as text (`YYYY-MM-DD`)
    #[serde(rename = "Air Date", default)]
    pub air_date: String,
    #[serde(rename = "Watched", default)]
    pub watched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ShowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_episodes: Option<u32>,
    #[serde(default)]
    pub episodes_watched: u32,
}

impl Episode {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey {
            show: self.show.clone(),
            episode: self.episode.clone(),
        }
    }

    /// Parse the air date; `None` when the stored text is empty or malformed
    pub fn air_date_parsed(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.air_date.trim(), "%Y-%m-%d").ok()
    }
}

/// Natural key of an episode: the (show, episode code) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub show: String,
    pub episode: String,
}

impl EpisodeKey {
    pub fn new(show: impl Into<String>, episode: impl Into<String>) -> Self {
        Self {
            show: show.into(),
            episode: episode.into(),
        }
    }
}

/// Partial edit of an episode. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeEdit {
    #[serde(rename = "Show", skip_serializing_if = "Option::is_none")]
    pub show: Option<String>,
    #[serde(rename = "Episode", skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    #[serde(rename = "Title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "Air Date", skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
    #[serde(rename = "Watched", skip_serializing_if = "Option::is_none")]
    pub watched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ShowStatus>,
}

impl EpisodeEdit {
    /// Seed an edit form from an existing episode (show, code, title, air date, watched)
    pub fn from_episode(episode: &Episode) -> Self {
        Self {
            show: Some(episode.show.clone()),
            episode: Some(episode.episode.clone()),
            title: Some(episode.title.clone()),
            air_date: Some(episode.air_date.clone()),
            watched: Some(episode.watched),
            status: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.show.is_none()
            && self.episode.is_none()
            && self.title.is_none()
            && self.air_date.is_none()
            && self.watched.is_none()
            && self.status.is_none()
    }

    /// Column → value map suitable for an update request
    pub fn to_update_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
