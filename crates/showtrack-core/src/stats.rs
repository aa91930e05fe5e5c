//! Aggregates derived from fetched episodes: per-show progress, dashboard
//! totals and progress buckets.

use serde::Serialize;
use showtrack_models::Episode;
use std::collections::BTreeMap;

/// `round(100 · watched / total)`, or 0 when there is nothing to watch
pub fn percentage(watched: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((watched as f64 / total as f64) * 100.0).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressCategory {
    /// Some but not all episodes watched
    Watching,
    NotStarted,
    /// Every episode watched
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowProgress {
    pub show: String,
    pub total: u64,
    pub watched: u64,
}

impl ShowProgress {
    pub fn percentage(&self) -> u32 {
        percentage(self.watched, self.total)
    }

    pub fn category(&self) -> ProgressCategory {
        if self.watched == 0 {
            ProgressCategory::NotStarted
        } else if self.watched >= self.total {
            ProgressCategory::Stopped
        } else {
            ProgressCategory::Watching
        }
    }
}

/// Episode and watched counts per show, ordered by show name
pub fn group_by_show(episodes: &[Episode]) -> Vec<ShowProgress> {
    let mut grouped: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for episode in episodes {
        let entry = grouped.entry(episode.show.as_str()).or_insert((0, 0));
        entry.0 += 1;
        if episode.watched {
            entry.1 += 1;
        }
    }

    grouped
        .into_iter()
        .map(|(show, (total, watched))| ShowProgress {
            show: show.to_string(),
            total,
            watched,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Categories {
    pub watching: usize,
    pub not_started: usize,
    pub stopped: usize,
}

pub fn categorize(shows: &[ShowProgress]) -> Categories {
    shows.iter().fold(Categories::default(), |mut acc, show| {
        match show.category() {
            ProgressCategory::Watching => acc.watching += 1,
            ProgressCategory::NotStarted => acc.not_started += 1,
            ProgressCategory::Stopped => acc.stopped += 1,
        }
        acc
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_episodes: u64,
    pub watched_episodes: u64,
    pub watched_percentage: u32,
    pub total_shows: usize,
    pub categories: Categories,
    pub shows: Vec<ShowProgress>,
}

impl DashboardSummary {
    /// Summarize `episodes`. `total_count` is the exact collection count when
    /// known; the fetched rows are used otherwise.
    pub fn from_episodes(episodes: &[Episode], total_count: Option<u64>) -> Self {
        let shows = group_by_show(episodes);
        let total_episodes = total_count.unwrap_or(episodes.len() as u64);
        let watched_episodes = episodes.iter().filter(|e| e.watched).count() as u64;

        Self {
            total_episodes,
            watched_episodes,
            watched_percentage: percentage(watched_episodes, total_episodes),
            total_shows: shows.len(),
            categories: categorize(&shows),
            shows,
        }
    }
}
