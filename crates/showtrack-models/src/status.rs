use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Viewing status a user can attach to a show.
///
/// Serialized with the exact labels stored in the `status` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ShowStatus {
    #[serde(rename = "Currently Watching")]
    CurrentlyWatching,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Plan to Watch")]
    PlanToWatch,
    #[serde(rename = "Dropped")]
    Dropped,
}

impl ShowStatus {
    pub const ALL: [ShowStatus; 4] = [
        ShowStatus::CurrentlyWatching,
        ShowStatus::Completed,
        ShowStatus::PlanToWatch,
        ShowStatus::Dropped,
    ];

    /// Column label as stored by the backend
    pub fn label(&self) -> &'static str {
        match self {
            ShowStatus::CurrentlyWatching => "Currently Watching",
            ShowStatus::Completed => "Completed",
            ShowStatus::PlanToWatch => "Plan to Watch",
            ShowStatus::Dropped => "Dropped",
        }
    }
}

impl fmt::Display for ShowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid show status: {}. Use 'watching', 'completed', 'plan-to-watch' or 'dropped'",
            self.0
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ShowStatus {
    type Err = ParseStatusError;

    /// Accepts both the stored labels and the short CLI spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        match normalized.as_str() {
            "currently-watching" | "watching" => Ok(ShowStatus::CurrentlyWatching),
            "completed" => Ok(ShowStatus::Completed),
            "plan-to-watch" | "planned" => Ok(ShowStatus::PlanToWatch),
            "dropped" => Ok(ShowStatus::Dropped),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_to_column_label() {
        let json = serde_json::to_string(&ShowStatus::PlanToWatch).unwrap();
        assert_eq!(json, "\"Plan to Watch\"");

        let parsed: ShowStatus = serde_json::from_str("\"Currently Watching\"").unwrap();
        assert_eq!(parsed, ShowStatus::CurrentlyWatching);
    }

    #[test]
    fn test_status_from_str_accepts_cli_spellings() {
        assert_eq!("watching".parse::<ShowStatus>(), Ok(ShowStatus::CurrentlyWatching));
        assert_eq!("Plan to Watch".parse::<ShowStatus>(), Ok(ShowStatus::PlanToWatch));
        assert_eq!("plan_to_watch".parse::<ShowStatus>(), Ok(ShowStatus::PlanToWatch));
        assert_eq!("DROPPED".parse::<ShowStatus>(), Ok(ShowStatus::Dropped));
        assert!("paused".parse::<ShowStatus>().is_err());
    }
}
